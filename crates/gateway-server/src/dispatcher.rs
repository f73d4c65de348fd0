//! Proxy dispatcher.
//!
//! Matches a request to a route, consults the response cache for reads,
//! fires the route's circuit breaker, and then stores or invalidates cache
//! entries depending on the outcome.

use crate::error::ApiError;
use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use gateway_core::{BackendRequest, BackendResponse, ProxyRequest};
use gateway_resilience::{is_cacheable_path, BreakerRegistry, CachedResponse, ResponseCache};
use gateway_routing::RouteTable;
use gateway_telemetry::GatewayMetrics;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Response header reporting cache use
pub const X_CACHE: &str = "x-cache";
/// Response header set when the body came from a fallback
pub const X_FALLBACK_RESPONSE: &str = "x-fallback-response";

/// Request headers forwarded to backends
const FORWARDED_HEADERS: [header::HeaderName; 4] = [
    header::CONTENT_TYPE,
    header::ACCEPT,
    header::AUTHORIZATION,
    header::HeaderName::from_static("x-request-id"),
];

/// Cache outcome for a proxied read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Served from cache
    Hit,
    /// Looked up, not found
    Miss,
}

impl CacheStatus {
    /// Header value
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Miss => "MISS",
        }
    }
}

/// A backend or cached response on its way back to the client
#[derive(Debug, Clone)]
pub struct ProxyReply {
    /// Route that served the request
    pub service: String,
    /// Status, content type and body
    pub response: BackendResponse,
    /// Cache use, for reads
    pub cache: Option<CacheStatus>,
}

impl IntoResponse for ProxyReply {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.response.status).unwrap_or(StatusCode::BAD_GATEWAY);
        let mut response = Response::new(Body::from(self.response.body));
        *response.status_mut() = status;

        let headers = response.headers_mut();
        if let Some(ct) = self
            .response
            .content_type
            .as_deref()
            .and_then(|ct| HeaderValue::from_str(ct).ok())
        {
            headers.insert(header::CONTENT_TYPE, ct);
        }
        if let Some(cache) = self.cache {
            headers.insert(X_CACHE, HeaderValue::from_static(cache.as_str()));
        }
        if self.response.fallback {
            headers.insert(X_FALLBACK_RESPONSE, HeaderValue::from_static("true"));
        }
        response
    }
}

/// Orchestrates cache, breaker and backend for one request
#[derive(Debug)]
pub struct ProxyDispatcher {
    routes: Arc<RouteTable>,
    breakers: Arc<BreakerRegistry>,
    cache: Option<Arc<ResponseCache>>,
    metrics: Arc<GatewayMetrics>,
}

impl ProxyDispatcher {
    /// Create a dispatcher
    pub fn new(
        routes: Arc<RouteTable>,
        breakers: Arc<BreakerRegistry>,
        cache: Option<Arc<ResponseCache>>,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self {
            routes,
            breakers,
            cache,
            metrics,
        }
    }

    /// Route table
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Proxy one request
    pub async fn handle(&self, request: ProxyRequest) -> Result<ProxyReply, ApiError> {
        let started = Instant::now();

        let Some(matched) = self.routes.match_path(&request.path) else {
            debug!(method = %request.method, path = %request.path, "No route matched");
            return Err(ApiError::route_not_found());
        };
        let route = matched.route;
        let service = route.service.as_str();

        // A route without a breaker is never proxied unprotected
        let Some(breaker) = self.breakers.get(service) else {
            warn!(service = %service, path = %request.path, "Route has no circuit breaker");
            return Err(ApiError::route_not_found());
        };

        // Reads consult the cache first
        let cache = self.cache.as_deref();
        let cache_key = match cache {
            Some(cache) if request.is_read() && is_cacheable_path(&request.path) => {
                Some(cache.cache_key(request.principal.as_ref(), &request.request_url()))
            }
            _ => None,
        };

        let mut cache_status = None;
        if let (Some(cache), Some(key)) = (cache, cache_key.as_deref()) {
            if let Some(hit) = cache.get(key).await {
                self.metrics.record_cache_lookup(service, true);
                let reply = ProxyReply {
                    service: service.to_string(),
                    response: hit.into_response(),
                    cache: Some(CacheStatus::Hit),
                };
                self.finish(&request, service, reply.response.status, started);
                return Ok(reply);
            }
            self.metrics.record_cache_lookup(service, false);
            cache_status = Some(CacheStatus::Miss);
        }

        let backend_request = BackendRequest::new(
            request.method.clone(),
            matched.backend_url(request.query.as_deref()),
        )
        .with_headers(forward_headers(&request.headers))
        .with_body(request.body.clone());

        let response = match breaker.fire(backend_request).await {
            Ok(response) => response,
            Err(err) => {
                let err = ApiError::from(err);
                self.finish(&request, service, err.status().as_u16(), started);
                return Err(err);
            }
        };

        if !response.fallback && response.is_success() {
            if let (Some(cache), Some(key)) = (cache, cache_key.as_deref()) {
                let ttl = cache.ttl_for(route.resource_class);
                cache
                    .set(key, &CachedResponse::from_response(&response), ttl)
                    .await;
            }

            if request.is_mutation() {
                if let (Some(cache), Some(principal)) = (cache, request.principal.as_ref()) {
                    let removed = cache
                        .invalidate_for(principal, route.resource_class, &route.prefix)
                        .await;
                    self.metrics.record_invalidation(service, removed);
                    debug!(
                        service = %service,
                        principal = %principal,
                        removed = removed,
                        "Invalidated cached responses"
                    );
                }
            }
        }

        self.finish(&request, service, response.status, started);
        Ok(ProxyReply {
            service: service.to_string(),
            response,
            cache: cache_status,
        })
    }

    fn finish(&self, request: &ProxyRequest, service: &str, status: u16, started: Instant) {
        let duration = started.elapsed();
        self.metrics
            .record_request(service, request.method.as_str(), status, duration);
        info!(
            service = %service,
            method = %request.method,
            endpoint = %request.path,
            status_code = status,
            duration_ms = duration.as_millis() as u64,
            "Request proxied"
        );
    }
}

/// Copy the forwardable subset of client headers
fn forward_headers(incoming: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for name in &FORWARDED_HEADERS {
        if let Some(value) = incoming.get(name) {
            headers.insert(name.clone(), value.clone());
        }
    }
    if let Some(value) = incoming.get("x-forwarded-for") {
        headers.insert("x-forwarded-for", value.clone());
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_headers_subset() {
        let mut incoming = HeaderMap::new();
        incoming.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        incoming.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer t"));
        incoming.insert(header::COOKIE, HeaderValue::from_static("session=1"));
        incoming.insert("x-request-id", HeaderValue::from_static("req-1"));
        incoming.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1"));

        let out = forward_headers(&incoming);
        assert_eq!(out.len(), 4);
        assert!(out.get(header::COOKIE).is_none());
        assert_eq!(out["x-request-id"], "req-1");
        assert_eq!(out["x-forwarded-for"], "10.0.0.1");
    }

    #[tokio::test]
    async fn test_route_without_breaker_is_not_found() {
        use axum::http::Method;
        use gateway_core::ResourceClass;
        use gateway_routing::Route;

        let routes = RouteTable::new(vec![Route::new(
            "user",
            "/api/users",
            Some("http://127.0.0.1:9".to_string()),
            ResourceClass::User,
        )]);
        let dispatcher = ProxyDispatcher::new(
            Arc::new(routes),
            Arc::new(BreakerRegistry::new()),
            None,
            Arc::new(GatewayMetrics::new().unwrap()),
        );

        let err = dispatcher
            .handle(ProxyRequest::new(Method::GET, "/api/users/1"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.message(), crate::error::ROUTE_NOT_FOUND_MESSAGE);
    }

    #[test]
    fn test_reply_headers() {
        let mut response = BackendResponse::new(503, Some("application/json".into()), "{}");
        response.fallback = true;
        let reply = ProxyReply {
            service: "review".into(),
            response,
            cache: Some(CacheStatus::Miss),
        };

        let response = reply.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[X_CACHE], "MISS");
        assert_eq!(response.headers()[X_FALLBACK_RESPONSE], "true");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    }
}
