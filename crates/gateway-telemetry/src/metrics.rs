//! Prometheus metrics.

use crate::TelemetryError;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Gateway metrics collector
#[derive(Clone)]
pub struct GatewayMetrics {
    registry: Registry,
    requests_total: IntCounterVec,
    request_duration: HistogramVec,
    cache_lookups: IntCounterVec,
    cache_invalidations: IntCounterVec,
    backend_calls: IntCounterVec,
    breaker_state: IntGaugeVec,
    breaker_transitions: IntCounterVec,
    fallbacks: IntCounterVec,
    rate_limited: IntCounter,
}

impl std::fmt::Debug for GatewayMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayMetrics").finish_non_exhaustive()
    }
}

impl GatewayMetrics {
    /// Create and register every metric on a fresh registry
    pub fn new() -> Result<Self, TelemetryError> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("gateway_requests_total", "Proxied requests by service, method and status"),
            &["service", "method", "status"],
        )?;
        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "gateway_request_duration_seconds",
                "End-to-end latency of proxied requests",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["service"],
        )?;
        let cache_lookups = IntCounterVec::new(
            Opts::new("gateway_cache_lookups_total", "Response cache lookups by result"),
            &["service", "result"],
        )?;
        let cache_invalidations = IntCounterVec::new(
            Opts::new(
                "gateway_cache_invalidated_keys_total",
                "Cache keys removed by write-triggered invalidation",
            ),
            &["service"],
        )?;
        let backend_calls = IntCounterVec::new(
            Opts::new("gateway_backend_calls_total", "Breaker-guarded backend calls by outcome"),
            &["service", "outcome"],
        )?;
        let breaker_state = IntGaugeVec::new(
            Opts::new(
                "gateway_circuit_breaker_state",
                "Circuit state: 0 closed, 1 open, 2 half-open",
            ),
            &["service"],
        )?;
        let breaker_transitions = IntCounterVec::new(
            Opts::new("gateway_circuit_breaker_transitions_total", "Circuit state changes"),
            &["service", "from", "to"],
        )?;
        let fallbacks = IntCounterVec::new(
            Opts::new("gateway_fallback_responses_total", "Fallback responses served"),
            &["service"],
        )?;
        let rate_limited = IntCounter::new(
            "gateway_rate_limited_total",
            "Requests rejected by the rate limiter",
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(cache_lookups.clone()))?;
        registry.register(Box::new(cache_invalidations.clone()))?;
        registry.register(Box::new(backend_calls.clone()))?;
        registry.register(Box::new(breaker_state.clone()))?;
        registry.register(Box::new(breaker_transitions.clone()))?;
        registry.register(Box::new(fallbacks.clone()))?;
        registry.register(Box::new(rate_limited.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            request_duration,
            cache_lookups,
            cache_invalidations,
            backend_calls,
            breaker_state,
            breaker_transitions,
            fallbacks,
            rate_limited,
        })
    }

    /// Record one proxied request
    pub fn record_request(&self, service: &str, method: &str, status: u16, duration: Duration) {
        self.requests_total
            .with_label_values(&[service, method, &status.to_string()])
            .inc();
        self.request_duration
            .with_label_values(&[service])
            .observe(duration.as_secs_f64());
    }

    /// Record a cache lookup
    pub fn record_cache_lookup(&self, service: &str, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.cache_lookups.with_label_values(&[service, result]).inc();
    }

    /// Record keys removed by invalidation
    pub fn record_invalidation(&self, service: &str, removed: u64) {
        self.cache_invalidations
            .with_label_values(&[service])
            .inc_by(removed);
    }

    /// Record a backend call outcome (`success` or `failure`)
    pub fn record_backend_call(&self, service: &str, outcome: &str) {
        self.backend_calls.with_label_values(&[service, outcome]).inc();
    }

    /// Set the current breaker state code
    pub fn set_breaker_state(&self, service: &str, state: i64) {
        self.breaker_state.with_label_values(&[service]).set(state);
    }

    /// Record a breaker transition
    pub fn record_breaker_transition(&self, service: &str, from: &str, to: &str) {
        self.breaker_transitions
            .with_label_values(&[service, from, to])
            .inc();
    }

    /// Record a fallback response
    pub fn record_fallback(&self, service: &str) {
        self.fallbacks.with_label_values(&[service]).inc();
    }

    /// Record a rate-limited request
    pub fn record_rate_limited(&self) {
        self.rate_limited.inc();
    }

    /// Render all metrics in the Prometheus text format
    pub fn render(&self) -> Result<String, TelemetryError> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Init(e.to_string()))
    }
}
