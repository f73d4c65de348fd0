//! HTTP request handlers for the gateway API.

use crate::{
    dispatcher::ProxyReply,
    error::ApiError,
    health::{check_services, HealthResponse, LivenessResponse},
    identity::Identity,
    state::AppState,
};
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use gateway_core::ProxyRequest;
use std::net::SocketAddr;
use tracing::{error, instrument};

/// Largest request body forwarded to a backend
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Liveness endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<LivenessResponse> {
    Json(LivenessResponse::new(state.started_at.elapsed()))
}

/// Backend health through each circuit breaker
#[instrument(skip(state))]
pub async fn health_details(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let report = check_services(&state).await;
    let status = StatusCode::from_u16(report.status.http_status_code())
        .unwrap_or(StatusCode::SERVICE_UNAVAILABLE);
    (status, Json(report))
}

/// Metrics endpoint (Prometheus format)
pub async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to render metrics");
            ApiError::internal("failed to render metrics").into_response()
        }
    }
}

/// Proxy everything no other route claims
pub async fn proxy(State(state): State<AppState>, request: Request) -> Result<ProxyReply, ApiError> {
    let (parts, body) = request.into_parts();

    let principal = match parts.extensions.get::<Identity>() {
        Some(Identity(principal)) => principal.clone(),
        None => state.identity.extract(&parts.headers),
    };
    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0);

    let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ApiError::new(StatusCode::PAYLOAD_TOO_LARGE, e.to_string()))?;

    let mut proxy_request = ProxyRequest::new(parts.method, parts.uri.path())
        .with_headers(with_forwarded_for(parts.headers, peer))
        .with_body(body)
        .with_principal(principal);
    if let Some(query) = parts.uri.query() {
        proxy_request = proxy_request.with_query(query);
    }

    // Detached so a client disconnect cannot abort the backend call or the
    // cache update that follows it
    let dispatcher = state.dispatcher.clone();
    tokio::spawn(async move { dispatcher.handle(proxy_request).await })
        .await
        .map_err(|e| {
            error!(error = %e, "Dispatcher task failed");
            ApiError::internal("request processing failed")
        })?
}

/// Append the peer address to `X-Forwarded-For`
fn with_forwarded_for(mut headers: HeaderMap, peer: Option<SocketAddr>) -> HeaderMap {
    let Some(peer) = peer else {
        return headers;
    };
    let ip = peer.ip().to_string();
    let value = match headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        Some(existing) if !existing.trim().is_empty() => format!("{existing}, {ip}"),
        _ => ip,
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert("x-forwarded-for", value);
    }
    headers
}
