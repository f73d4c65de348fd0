//! # Gateway Server
//!
//! HTTP server for the edge gateway.
//!
//! This crate provides:
//! - Axum-based HTTP server with graceful shutdown
//! - The proxy dispatcher tying routing, cache and circuit breakers together
//! - Caller identity extraction (JWT or trusted header)
//! - Per-client rate limiting
//! - Liveness and per-backend health endpoints
//! - Prometheus metrics endpoint

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod health;
pub mod identity;
pub mod observer;
pub mod rate_limit;
pub mod routes;
pub mod server;
pub mod shutdown;
pub mod state;

// Re-export main types
pub use dispatcher::{CacheStatus, ProxyDispatcher, ProxyReply, X_CACHE, X_FALLBACK_RESPONSE};
pub use error::{ApiError, ROUTE_NOT_FOUND_MESSAGE};
pub use health::{HealthResponse, HealthStatus, LivenessResponse, ServiceHealth};
pub use identity::{
    build_identity_extractor, HeaderIdentityExtractor, Identity, IdentityExtractor,
    JwtIdentityExtractor, NoIdentity,
};
pub use observer::MetricsObserver;
pub use rate_limit::RateLimiter;
pub use routes::create_router;
pub use server::{Server, ServerError};
pub use shutdown::shutdown_signal;
pub use state::{AppState, AppStateBuilder};
