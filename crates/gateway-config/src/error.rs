//! Configuration errors.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The file could not be parsed
    #[error("failed to parse config file {path}: {message}")]
    Parse {
        /// File path
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// The file extension is not `.yaml`, `.yml` or `.toml`
    #[error("unsupported config format for {0}; expected .yaml, .yml or .toml")]
    UnsupportedFormat(PathBuf),

    /// An environment override holds an unusable value
    #[error("invalid value for environment variable {key}: {message}")]
    InvalidEnv {
        /// Variable name
        key: String,
        /// Problem description
        message: String,
    },

    /// One or more validation problems
    #[error("invalid configuration: {}", .0.join("; "))]
    Validation(Vec<String>),
}
