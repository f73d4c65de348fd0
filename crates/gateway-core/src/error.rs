//! Error types for the gateway.
//!
//! Every failure that can surface from the proxy pipeline is one variant of
//! [`GatewayError`]. The variant decides two things: whether the retry policy
//! may try again, and which HTTP status the caller eventually sees.

use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

/// Result alias used across the gateway crates
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Gateway error taxonomy
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// No route prefix matched the request path
    #[error("no route for path {path}")]
    RouteNotFound {
        /// Request path that failed to match
        path: String,
    },

    /// Backend answered with a 4xx status. Terminal, never retried.
    #[error("backend {service} rejected the request with status {status}")]
    ClientError {
        /// Backend service name
        service: String,
        /// Status returned by the backend
        status: u16,
        /// Raw response body, passed through to the caller
        body: Bytes,
    },

    /// Backend answered with a 5xx status
    #[error("backend {service} failed with status {status}")]
    Upstream {
        /// Backend service name
        service: String,
        /// Status returned by the backend
        status: u16,
        /// Raw response body
        body: Bytes,
    },

    /// The connection to the backend could not be established or broke
    #[error("connection to {service} failed: {message}")]
    Connection {
        /// Backend service name
        service: String,
        /// Transport error description
        message: String,
    },

    /// A single attempt exceeded its deadline
    #[error("request to {service} timed out after {timeout:?}")]
    Timeout {
        /// Backend service name
        service: String,
        /// Per-attempt timeout that elapsed
        timeout: Duration,
    },

    /// Invalid configuration
    #[error("configuration error: {message}")]
    Configuration {
        /// Error description
        message: String,
    },

    /// Anything else
    #[error("internal error: {message}")]
    Internal {
        /// Error description
        message: String,
    },
}

impl GatewayError {
    /// Create a route-not-found error
    pub fn route_not_found(path: impl Into<String>) -> Self {
        Self::RouteNotFound { path: path.into() }
    }

    /// Create a connection error
    pub fn connection(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(service: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            service: service.into(),
            timeout,
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Classify a backend status into the matching error.
    ///
    /// Only meaningful for statuses >= 400; anything in `[400, 500)` is a
    /// terminal client error, the rest is treated as an upstream failure.
    pub fn from_backend_status(service: impl Into<String>, status: u16, body: Bytes) -> Self {
        let service = service.into();
        if (400..500).contains(&status) {
            Self::ClientError {
                service,
                status,
                body,
            }
        } else {
            Self::Upstream {
                service,
                status,
                body,
            }
        }
    }

    /// Whether another attempt may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Upstream { .. } | Self::Connection { .. } | Self::Timeout { .. }
        )
    }

    /// HTTP status the caller receives for this error
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::RouteNotFound { .. } => 404,
            Self::ClientError { status, .. } | Self::Upstream { status, .. } => *status,
            Self::Connection { .. } => 502,
            Self::Timeout { .. } => 504,
            Self::Configuration { .. } | Self::Internal { .. } => 500,
        }
    }

    /// Short label for metrics
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::RouteNotFound { .. } => "route_not_found",
            Self::ClientError { .. } => "client_error",
            Self::Upstream { .. } => "upstream",
            Self::Connection { .. } => "connection",
            Self::Timeout { .. } => "timeout",
            Self::Configuration { .. } => "configuration",
            Self::Internal { .. } => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_status_classification() {
        let err = GatewayError::from_backend_status("users", 404, Bytes::new());
        assert!(matches!(err, GatewayError::ClientError { status: 404, .. }));
        assert!(!err.is_retryable());

        let err = GatewayError::from_backend_status("users", 503, Bytes::new());
        assert!(matches!(err, GatewayError::Upstream { status: 503, .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(GatewayError::route_not_found("/x").status_code(), 404);
        assert_eq!(
            GatewayError::timeout("users", Duration::from_secs(5)).status_code(),
            504
        );
        assert_eq!(GatewayError::connection("users", "refused").status_code(), 502);
        assert_eq!(
            GatewayError::from_backend_status("users", 502, Bytes::new()).status_code(),
            502
        );
        assert_eq!(GatewayError::internal("boom").status_code(), 500);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(GatewayError::timeout("svc", Duration::from_millis(10)).is_retryable());
        assert!(GatewayError::connection("svc", "reset").is_retryable());
        assert!(!GatewayError::route_not_found("/x").is_retryable());
        assert!(!GatewayError::configuration("bad").is_retryable());
        assert!(!GatewayError::internal("boom").is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = GatewayError::timeout("reviews", Duration::from_millis(250));
        assert_eq!(err.to_string(), "request to reviews timed out after 250ms");
        assert_eq!(err.error_type(), "timeout");
    }
}
