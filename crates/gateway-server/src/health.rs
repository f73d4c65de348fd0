//! Health checks.
//!
//! `/health` is a liveness probe that touches nothing. `/health/details`
//! sends a GET to every backend's health path through that backend's
//! circuit breaker, so an open circuit reports DOWN without a network call.

use crate::state::AppState;
use futures::future::join_all;
use gateway_core::BackendRequest;
use gateway_resilience::{CacheStats, CircuitBreaker};
use gateway_routing::Route;
use http::Method;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::debug;

/// Health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    /// Reachable and answering
    Up,
    /// Unreachable, failing, or circuit open
    Down,
}

impl HealthStatus {
    /// HTTP status code for this health status
    #[must_use]
    pub fn http_status_code(self) -> u16 {
        match self {
            Self::Up => 200,
            Self::Down => 503,
        }
    }
}

/// Liveness response
#[derive(Debug, Clone, Serialize)]
pub struct LivenessResponse {
    /// Always UP while the process serves requests
    pub status: HealthStatus,
    /// Gateway version
    pub version: &'static str,
    /// Seconds since start
    pub uptime_seconds: u64,
}

impl LivenessResponse {
    /// Build for the given uptime
    pub fn new(uptime: Duration) -> Self {
        Self {
            status: HealthStatus::Up,
            version: env!("CARGO_PKG_VERSION"),
            uptime_seconds: uptime.as_secs(),
        }
    }
}

/// One backend's health
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    /// Service name
    pub name: String,
    /// Result of the probe
    pub status: HealthStatus,
    /// Breaker state after the probe
    pub circuit: String,
    /// Failure percentage over the breaker window
    pub failure_rate: f64,
    /// Probe duration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    /// Why the service is down
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Cache summary
#[derive(Debug, Clone, Serialize)]
pub struct CacheHealth {
    /// Backend name
    pub backend: &'static str,
    /// Whether the backend currently answers
    pub connected: bool,
    /// Counters
    pub stats: CacheStats,
}

/// Aggregated health response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// UP only when every service is UP
    pub status: HealthStatus,
    /// Gateway version
    pub version: &'static str,
    /// Seconds since start
    pub uptime_seconds: u64,
    /// Per-service results, sorted by name
    pub services: Vec<ServiceHealth>,
    /// Cache summary. The cache never affects overall status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheHealth>,
    /// RFC 3339
    pub timestamp: String,
}

impl HealthResponse {
    /// Aggregate service results
    pub fn new(services: Vec<ServiceHealth>, uptime: Duration) -> Self {
        let status = if services.iter().all(|s| s.status == HealthStatus::Up) {
            HealthStatus::Up
        } else {
            HealthStatus::Down
        };
        Self {
            status,
            version: env!("CARGO_PKG_VERSION"),
            uptime_seconds: uptime.as_secs(),
            services,
            cache: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Attach the cache summary
    #[must_use]
    pub fn with_cache(mut self, cache: Option<CacheHealth>) -> Self {
        self.cache = cache;
        self
    }
}

/// Probe every backend concurrently
pub async fn check_services(state: &AppState) -> HealthResponse {
    let checks = state.routes.routes().iter().map(|route| async move {
        match state.breakers.get(&route.service) {
            Some(breaker) => probe(route, breaker).await,
            None => ServiceHealth {
                name: route.service.clone(),
                status: HealthStatus::Down,
                circuit: "unknown".to_string(),
                failure_rate: 0.0,
                response_time_ms: None,
                error: Some("no circuit breaker".to_string()),
            },
        }
    });
    let mut services = join_all(checks).await;
    services.sort_by(|a, b| a.name.cmp(&b.name));

    let cache = state.cache.as_ref().map(|c| CacheHealth {
        backend: c.backend_name(),
        connected: c.is_connected(),
        stats: c.stats(),
    });

    HealthResponse::new(services, state.started_at.elapsed()).with_cache(cache)
}

async fn probe(route: &Route, breaker: &CircuitBreaker) -> ServiceHealth {
    let started = Instant::now();

    let (status, error) = match route.health_url() {
        None => (HealthStatus::Down, Some("no backend configured".to_string())),
        Some(url) => match breaker.fire(BackendRequest::new(Method::GET, url)).await {
            Ok(resp) if resp.fallback => {
                (HealthStatus::Down, Some("circuit open".to_string()))
            }
            Ok(_) => (HealthStatus::Up, None),
            Err(e) => (HealthStatus::Down, Some(e.to_string())),
        },
    };

    let stats = breaker.stats();
    debug!(service = %route.service, status = ?status, "Health probe finished");

    ServiceHealth {
        name: route.service.clone(),
        status,
        circuit: stats.state.to_string(),
        failure_rate: stats.failure_rate(),
        response_time_ms: Some(started.elapsed().as_millis() as u64),
        error,
    }
}
