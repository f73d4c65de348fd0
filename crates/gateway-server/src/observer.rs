//! Breaker events to Prometheus.

use gateway_resilience::{BreakerEvent, BreakerObserver};
use gateway_telemetry::GatewayMetrics;
use std::sync::Arc;

/// Feeds breaker events into the metrics registry
#[derive(Debug, Clone)]
pub struct MetricsObserver {
    metrics: Arc<GatewayMetrics>,
}

impl MetricsObserver {
    /// Create an observer
    pub fn new(metrics: Arc<GatewayMetrics>) -> Self {
        Self { metrics }
    }
}

impl BreakerObserver for MetricsObserver {
    fn on_event(&self, event: &BreakerEvent) {
        match event {
            BreakerEvent::Success { service, .. } => {
                self.metrics.record_backend_call(service, "success");
            }
            BreakerEvent::Failure { service, .. } => {
                self.metrics.record_backend_call(service, "failure");
            }
            BreakerEvent::Fallback { service, .. } => self.metrics.record_fallback(service),
            BreakerEvent::StateChange { service, from, to } => {
                self.metrics.set_breaker_state(service, i64::from(*to as u8));
                self.metrics
                    .record_breaker_transition(service, &from.to_string(), &to.to_string());
            }
        }
    }
}
