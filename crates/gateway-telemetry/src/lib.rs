//! # Gateway Telemetry
//!
//! Observability for the edge gateway.
//!
//! This crate provides:
//! - Structured logging (human or JSON) with `RUST_LOG` filtering
//! - Prometheus metrics for proxied requests, cache activity and breakers

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod logging;
pub mod metrics;

// Re-export main types
pub use logging::{init_logging, LogOutput, LoggingConfig};
pub use metrics::GatewayMetrics;

/// Telemetry initialization error
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to install the global subscriber
    #[error("Failed to initialize logging: {0}")]
    Init(String),
    /// Failed to create, register or encode a metric
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}
