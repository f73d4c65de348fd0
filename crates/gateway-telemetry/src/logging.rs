//! Logging setup.

use crate::TelemetryError;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogOutput {
    /// Human-readable
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Output format
    pub output: LogOutput,
    /// Include the module target in each line
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            output: LogOutput::Pretty,
            with_target: true,
        }
    }
}

impl LoggingConfig {
    /// Create a configuration with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the level directive
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Set the output format
    #[must_use]
    pub fn with_output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    /// Build the filter: `RUST_LOG` wins, then the configured level
    #[must_use]
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Install the global subscriber
///
/// # Errors
/// Returns error if a global subscriber is already set
pub fn init_logging(config: &LoggingConfig) -> Result<(), TelemetryError> {
    let filter = config.env_filter();

    let layer = match config.output {
        LogOutput::Pretty => fmt::layer()
            .with_target(config.with_target)
            .with_filter(filter)
            .boxed(),
        LogOutput::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(config.with_target)
            .with_filter(filter)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| TelemetryError::Init(e.to_string()))?;

    info!(level = %config.level, output = ?config.output, "Logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = LoggingConfig::new()
            .with_level("debug")
            .with_output(LogOutput::Json);
        assert_eq!(config.level, "debug");
        assert_eq!(config.output, LogOutput::Json);
    }

    #[test]
    fn test_bad_level_falls_back() {
        let config = LoggingConfig::new().with_level("[[[not a directive");
        // Must not panic regardless of RUST_LOG
        let _ = config.env_filter();
    }
}
