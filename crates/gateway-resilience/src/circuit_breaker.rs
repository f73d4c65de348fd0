//! Circuit breaker pattern implementation.
//!
//! The circuit breaker prevents cascading failures by stopping requests
//! to a failing service and allowing it time to recover.
//!
//! State changes go through [`CircuitState::transition`], a pure function of
//! the current state and a [`BreakerSignal`]. Side effects (logs, metrics)
//! are delivered afterwards to the registered [`BreakerObserver`]s.
//!
//! ```text
//!   CLOSED --threshold reached--> OPEN --reset timeout--> HALF_OPEN
//!     ^                            ^                          |
//!     |                            +------probe failed--------+
//!     +---------------------------probe succeeded-------------+
//! ```

use crate::retry::{RetryPolicy, RetryResult};
use crate::window::{RollingWindow, WindowSnapshot};
use gateway_core::{
    BackendExecutor, BackendRequest, BackendResponse, FallbackResponse, GatewayError,
    GatewayResult,
};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally
    Closed = 0,
    /// Circuit is open, requests get the fallback
    Open = 1,
    /// Circuit is half-open, one probe decides the next state
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Open,
            2 => Self::HalfOpen,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Inputs that can move the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerSignal {
    /// Rolling failure rate went above the threshold
    FailureThresholdExceeded,
    /// The reset timeout elapsed while open
    ResetTimeoutElapsed,
    /// The half-open probe succeeded
    ProbeSucceeded,
    /// The half-open probe failed
    ProbeFailed,
}

impl CircuitState {
    /// Next state for `signal`. Signals that do not apply leave the state
    /// unchanged.
    #[must_use]
    pub fn transition(self, signal: BreakerSignal) -> Self {
        match (self, signal) {
            (Self::Closed, BreakerSignal::FailureThresholdExceeded) => Self::Open,
            (Self::Open, BreakerSignal::ResetTimeoutElapsed) => Self::HalfOpen,
            (Self::HalfOpen, BreakerSignal::ProbeSucceeded) => Self::Closed,
            (Self::HalfOpen, BreakerSignal::ProbeFailed) => Self::Open,
            (state, _) => state,
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failure percentage (0-100) the window must exceed to open the circuit
    pub failure_rate_threshold: f64,
    /// Minimum samples in the window before the rate is evaluated
    pub min_requests: u32,
    /// Rolling window length
    pub window: Duration,
    /// Buckets the window is split into
    pub window_buckets: u32,
    /// Time to stay open before allowing a probe
    pub reset_timeout: Duration,
    /// Deadline for each outbound attempt
    pub call_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 50.0,
            min_requests: 5,
            window: Duration::from_secs(60),
            window_buckets: 10,
            reset_timeout: Duration::from_secs(15),
            call_timeout: Duration::from_secs(5),
        }
    }
}

/// Observable breaker activity
#[derive(Debug, Clone)]
pub enum BreakerEvent {
    /// A call completed and counted as healthy
    Success {
        /// Service name
        service: String,
        /// Attempts used
        attempts: u32,
        /// Wall time including retries
        duration: Duration,
    },
    /// A call failed after retries
    Failure {
        /// Service name
        service: String,
        /// Attempts used
        attempts: u32,
        /// Wall time including retries
        duration: Duration,
        /// Error label
        error_type: &'static str,
        /// Error description
        message: String,
    },
    /// The fallback was served instead of calling the backend
    Fallback {
        /// Service name
        service: String,
        /// State at the time
        state: CircuitState,
    },
    /// The state machine moved
    StateChange {
        /// Service name
        service: String,
        /// Previous state
        from: CircuitState,
        /// New state
        to: CircuitState,
    },
}

/// Receives breaker events. Implementations must not block.
pub trait BreakerObserver: Send + Sync {
    /// Handle one event
    fn on_event(&self, event: &BreakerEvent);
}

/// Observer that turns events into log lines
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl BreakerObserver for LoggingObserver {
    fn on_event(&self, event: &BreakerEvent) {
        match event {
            BreakerEvent::Success {
                service,
                attempts,
                duration,
            } => debug!(
                service = %service,
                attempts = attempts,
                duration_ms = duration.as_millis() as u64,
                "Backend call succeeded"
            ),
            BreakerEvent::Failure {
                service,
                attempts,
                error_type,
                message,
                ..
            } => warn!(
                service = %service,
                attempts = attempts,
                error_type = error_type,
                error = %message,
                "Backend call failed"
            ),
            BreakerEvent::Fallback { service, state } => info!(
                service = %service,
                state = %state,
                "Serving fallback response"
            ),
            BreakerEvent::StateChange { service, from, to } => warn!(
                service = %service,
                from = %from,
                to = %to,
                "Circuit breaker state changed"
            ),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    window: RollingWindow,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

enum Admission {
    Normal,
    Probe,
    Rejected(CircuitState),
}

/// Snapshot of breaker state for health and admin endpoints
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerStats {
    /// Current state
    pub state: CircuitState,
    /// Samples in the rolling window
    pub window: WindowSnapshot,
    /// Time since the circuit last opened, while open or half-open
    pub open_for: Option<Duration>,
}

impl CircuitBreakerStats {
    /// Failure percentage over the window
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        self.window.failure_rate()
    }
}

/// Circuit breaker guarding one backend service
pub struct CircuitBreaker {
    service: String,
    config: CircuitBreakerConfig,
    retry: RetryPolicy,
    executor: Arc<dyn BackendExecutor>,
    fallback: FallbackResponse,
    /// Mirror of `inner.state` for lock-free reads
    state: AtomicU8,
    inner: Mutex<BreakerInner>,
    observers: Vec<Arc<dyn BreakerObserver>>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("service", &self.service)
            .field("state", &self.state())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    #[must_use]
    pub fn new(
        service: impl Into<String>,
        config: CircuitBreakerConfig,
        retry: RetryPolicy,
        executor: Arc<dyn BackendExecutor>,
        fallback: FallbackResponse,
    ) -> Self {
        let window = RollingWindow::new(config.window, config.window_buckets);
        Self {
            service: service.into(),
            config,
            retry,
            executor,
            fallback,
            state: AtomicU8::new(CircuitState::Closed as u8),
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                window,
                opened_at: None,
                probe_in_flight: false,
            }),
            observers: Vec::new(),
        }
    }

    /// Register an observer
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn BreakerObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Service name
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Fallback served while open
    #[must_use]
    pub fn fallback(&self) -> &FallbackResponse {
        &self.fallback
    }

    /// Get the current state
    #[must_use]
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Send a request through retry and timeout, guarded by the breaker.
    ///
    /// Open circuits answer with `Ok` carrying the fallback and never touch
    /// the network. A failed half-open probe reopens the circuit and also
    /// answers with the fallback. Backend 4xx replies come back as
    /// `Err(ClientError)` but count as healthy.
    pub async fn fire(&self, request: BackendRequest) -> GatewayResult<BackendResponse> {
        match self.try_acquire() {
            Admission::Rejected(state) => {
                self.emit(&BreakerEvent::Fallback {
                    service: self.service.clone(),
                    state,
                });
                Ok(self.fallback.to_response())
            }
            Admission::Normal => {
                let result = self.call(&request).await;
                if counts_as_failure(&result) {
                    self.record_failure();
                    result
                } else {
                    self.record_success();
                    result
                }
            }
            Admission::Probe => {
                let mut permit = ProbePermit {
                    breaker: self,
                    resolved: false,
                };
                let result = self.call(&request).await;
                permit.resolved = true;

                if counts_as_failure(&result) {
                    self.resolve_probe(BreakerSignal::ProbeFailed);
                    self.emit(&BreakerEvent::Fallback {
                        service: self.service.clone(),
                        state: CircuitState::HalfOpen,
                    });
                    Ok(self.fallback.to_response())
                } else {
                    self.resolve_probe(BreakerSignal::ProbeSucceeded);
                    result
                }
            }
        }
    }

    /// One retried, deadline-bounded call. Emits a success or failure event.
    async fn call(&self, request: &BackendRequest) -> GatewayResult<BackendResponse> {
        let timeout = self.config.call_timeout;
        let service = self.service.as_str();
        let executor = &self.executor;
        let started = Instant::now();

        let outcome = self
            .retry
            .execute(&request.url, || async move {
                match tokio::time::timeout(timeout, executor.execute(service, request)).await {
                    Ok(result) => result,
                    Err(_) => Err(GatewayError::timeout(service, timeout)),
                }
            })
            .await;

        let attempts = outcome.attempts();
        let duration = started.elapsed();
        let result = match outcome {
            RetryResult::Success { value, .. } => Ok(value),
            RetryResult::Exhausted { error, .. } | RetryResult::Terminal { error, .. } => {
                Err(error)
            }
        };

        let event = match &result {
            Err(error) if counts_as_failure(&result) => BreakerEvent::Failure {
                service: self.service.clone(),
                attempts,
                duration,
                error_type: error.error_type(),
                message: error.to_string(),
            },
            _ => BreakerEvent::Success {
                service: self.service.clone(),
                attempts,
                duration,
            },
        };
        self.emit(&event);

        result
    }

    fn try_acquire(&self) -> Admission {
        let mut events = Vec::new();
        let admission = {
            let mut inner = self.inner.lock();
            match inner.state {
                CircuitState::Closed => Admission::Normal,
                CircuitState::Open => {
                    let elapsed = inner.opened_at.map_or(Duration::MAX, |t| t.elapsed());
                    if elapsed >= self.config.reset_timeout {
                        self.apply(&mut inner, BreakerSignal::ResetTimeoutElapsed, &mut events);
                        inner.probe_in_flight = true;
                        Admission::Probe
                    } else {
                        Admission::Rejected(CircuitState::Open)
                    }
                }
                CircuitState::HalfOpen => {
                    if inner.probe_in_flight {
                        Admission::Rejected(CircuitState::HalfOpen)
                    } else {
                        inner.probe_in_flight = true;
                        Admission::Probe
                    }
                }
            }
        };
        self.emit_all(&events);
        admission
    }

    /// Record a successful request
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::Closed {
            inner.window.record_success(Instant::now());
        }
    }

    /// Record a failed request and open the circuit once the failure rate
    /// exceeds the threshold
    pub fn record_failure(&self) {
        let mut events = Vec::new();
        {
            let mut inner = self.inner.lock();
            if inner.state != CircuitState::Closed {
                return;
            }
            let now = Instant::now();
            inner.window.record_failure(now);
            let snapshot = inner.window.snapshot(now);

            if snapshot.total() >= self.config.min_requests
                && snapshot.failure_rate() > self.config.failure_rate_threshold
            {
                debug!(
                    service = %self.service,
                    failures = snapshot.failures,
                    total = snapshot.total(),
                    failure_rate = snapshot.failure_rate(),
                    threshold = self.config.failure_rate_threshold,
                    "Circuit breaker failure threshold exceeded"
                );
                self.apply(&mut inner, BreakerSignal::FailureThresholdExceeded, &mut events);
            }
        }
        self.emit_all(&events);
    }

    fn resolve_probe(&self, signal: BreakerSignal) {
        let mut events = Vec::new();
        {
            let mut inner = self.inner.lock();
            inner.probe_in_flight = false;
            self.apply(&mut inner, signal, &mut events);
        }
        self.emit_all(&events);
    }

    /// Run the pure transition and perform the entry actions of the new state
    fn apply(&self, inner: &mut BreakerInner, signal: BreakerSignal, events: &mut Vec<BreakerEvent>) {
        let from = inner.state;
        let to = from.transition(signal);
        if from == to {
            return;
        }
        self.enter(inner, to);
        events.push(BreakerEvent::StateChange {
            service: self.service.clone(),
            from,
            to,
        });
    }

    fn enter(&self, inner: &mut BreakerInner, to: CircuitState) {
        inner.state = to;
        inner.window.clear();
        match to {
            CircuitState::Open => inner.opened_at = Some(Instant::now()),
            CircuitState::Closed => {
                inner.opened_at = None;
                inner.probe_in_flight = false;
            }
            CircuitState::HalfOpen => {}
        }
        self.state.store(to as u8, Ordering::Release);
    }

    /// Force the circuit closed and forget all samples
    pub fn reset(&self) {
        self.force(CircuitState::Closed);
    }

    /// Force the circuit open, restarting the reset timeout
    pub fn force_open(&self) {
        self.force(CircuitState::Open);
    }

    fn force(&self, to: CircuitState) {
        let from = {
            let mut inner = self.inner.lock();
            let from = inner.state;
            inner.probe_in_flight = false;
            self.enter(&mut inner, to);
            from
        };
        info!(service = %self.service, from = %from, to = %to, "Circuit breaker forced");
        if from != to {
            self.emit(&BreakerEvent::StateChange {
                service: self.service.clone(),
                from,
                to,
            });
        }
    }

    /// Get breaker statistics
    #[must_use]
    pub fn stats(&self) -> CircuitBreakerStats {
        let mut inner = self.inner.lock();
        let window = inner.window.snapshot(Instant::now());
        CircuitBreakerStats {
            state: inner.state,
            window,
            open_for: inner.opened_at.map(|t| t.elapsed()),
        }
    }

    fn emit(&self, event: &BreakerEvent) {
        for observer in &self.observers {
            observer.on_event(event);
        }
    }

    fn emit_all(&self, events: &[BreakerEvent]) {
        for event in events {
            self.emit(event);
        }
    }
}

/// Backend 4xx replies say nothing about backend health
fn counts_as_failure(result: &GatewayResult<BackendResponse>) -> bool {
    matches!(result, Err(e) if !matches!(e, GatewayError::ClientError { .. }))
}

/// Reopens the circuit if a probe is dropped before it resolves, so an
/// abandoned probe cannot wedge the breaker in half-open.
struct ProbePermit<'a> {
    breaker: &'a CircuitBreaker,
    resolved: bool,
}

impl Drop for ProbePermit<'_> {
    fn drop(&mut self) {
        if !self.resolved {
            self.breaker.resolve_probe(BreakerSignal::ProbeFailed);
        }
    }
}
