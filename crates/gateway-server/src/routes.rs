//! Route definitions for the gateway API.

use crate::{
    handlers,
    identity::identity_middleware,
    rate_limit::{rate_limit_middleware, RateLimitState},
    state::AppState,
};
use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

/// Create the main router.
///
/// Health and metrics routes are served directly. Every other path goes
/// to the proxy, behind identity extraction and, when enabled, the rate
/// limiter.
pub fn create_router(state: AppState) -> Router {
    let request_timeout = state.config.server.request_timeout;

    let mut proxy = Router::new().fallback(handlers::proxy);
    if let Some(limiter) = &state.rate_limiter {
        proxy = proxy.layer(middleware::from_fn_with_state(
            RateLimitState {
                limiter: Arc::clone(limiter),
                metrics: Arc::clone(&state.metrics),
            },
            rate_limit_middleware,
        ));
    }
    let proxy = proxy.layer(middleware::from_fn_with_state(
        Arc::clone(&state.identity),
        identity_middleware,
    ));

    let mut router = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/health/details", get(handlers::health_details));
    if state.config.telemetry.metrics_enabled {
        router = router.route("/metrics", get(handlers::metrics_endpoint));
    }

    router
        .merge(proxy)
        .layer(TimeoutLayer::new(non_zero(request_timeout)))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

fn non_zero(timeout: Duration) -> Duration {
    if timeout.is_zero() {
        Duration::from_secs(60)
    } else {
        timeout
    }
}
