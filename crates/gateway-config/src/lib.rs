//! # Gateway Config
//!
//! Configuration management for the edge gateway.
//!
//! This crate provides:
//! - Typed configuration with defaults for every section
//! - YAML and TOML file loading
//! - Environment variable overrides
//! - Field and cross-field validation

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod loader;
pub mod validation;

// Re-export main types
pub use config::{
    AuthConfig, AuthMode, BreakerSettings, CacheConfig, CacheTtlConfig, FallbackSettings,
    GatewayConfig, LogFormat, RateLimitConfig, RetrySettings, ServerConfig, ServiceConfig,
    TelemetryConfig,
};
pub use error::{ConfigError, ConfigResult};
pub use loader::{apply_env_overrides, load_config, ConfigLoader};
pub use validation::validate_config;
