//! Shared application state.

use crate::{
    dispatcher::ProxyDispatcher,
    identity::{build_identity_extractor, IdentityExtractor},
    observer::MetricsObserver,
    rate_limit::RateLimiter,
};
use gateway_config::{CacheConfig, GatewayConfig, ServiceConfig};
use gateway_core::{BackendExecutor, GatewayError, GatewayResult};
use gateway_resilience::{
    resolve_fallback, BreakerRegistry, CacheBackend, CircuitBreaker, CircuitBreakerConfig,
    HttpExecutor, LoggingObserver, MemoryCacheBackend, RedisCacheBackend, ResponseCache,
    ResponseCacheConfig, RetryConfig, RetryPolicy, TtlPolicy,
};
use gateway_routing::RouteTable;
use gateway_telemetry::GatewayMetrics;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::info;

/// State shared by every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration
    pub config: Arc<GatewayConfig>,
    /// Route table
    pub routes: Arc<RouteTable>,
    /// One breaker per service
    pub breakers: Arc<BreakerRegistry>,
    /// Response cache, absent when caching is disabled
    pub cache: Option<Arc<ResponseCache>>,
    /// Proxy pipeline
    pub dispatcher: Arc<ProxyDispatcher>,
    /// Caller identity
    pub identity: Arc<dyn IdentityExtractor>,
    /// Rate limiter, absent when disabled
    pub rate_limiter: Option<Arc<RateLimiter>>,
    /// Metrics registry
    pub metrics: Arc<GatewayMetrics>,
    /// Process start
    pub started_at: Instant,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("routes", &self.routes.len())
            .field("breakers", &self.breakers.len())
            .field("cache", &self.cache.as_ref().map(|c| c.backend_name()))
            .field("identity", &self.identity.name())
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create a builder
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::default()
    }

    /// Start background work: the cache connectivity monitor
    pub fn spawn_background_tasks(&self) -> Vec<JoinHandle<()>> {
        let mut tasks = Vec::new();
        if let Some(cache) = &self.cache {
            tasks.push(cache.spawn_monitor(self.config.cache.health_check_interval));
        }
        tasks
    }
}

/// Builder for [`AppState`]
#[derive(Default)]
pub struct AppStateBuilder {
    config: Option<GatewayConfig>,
    executor: Option<Arc<dyn BackendExecutor>>,
    cache_backend: Option<Arc<dyn CacheBackend>>,
}

impl AppStateBuilder {
    /// Set configuration
    #[must_use]
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Override the outbound executor
    #[must_use]
    pub fn executor(mut self, executor: Arc<dyn BackendExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Override the cache backend chosen from configuration
    #[must_use]
    pub fn cache_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.cache_backend = Some(backend);
        self
    }

    /// Build the state
    pub fn build(self) -> GatewayResult<AppState> {
        let config = self.config.unwrap_or_default();

        let metrics = Arc::new(
            GatewayMetrics::new().map_err(|e| GatewayError::internal(e.to_string()))?,
        );

        let executor: Arc<dyn BackendExecutor> = match self.executor {
            Some(executor) => executor,
            None => Arc::new(HttpExecutor::with_defaults()?),
        };

        let routes = Arc::new(RouteTable::from_services(&config.services));

        let mut registry = BreakerRegistry::new();
        for service in &config.services {
            let breaker = build_breaker(service, Arc::clone(&executor))
                .with_observer(Arc::new(LoggingObserver))
                .with_observer(Arc::new(MetricsObserver::new(Arc::clone(&metrics))));
            metrics.set_breaker_state(&service.name, 0);
            registry = registry.with_breaker(breaker);
        }
        let breakers = Arc::new(registry);

        let cache = if config.cache.enabled {
            let backend = match self.cache_backend {
                Some(backend) => backend,
                None => build_cache_backend(&config.cache)?,
            };
            let cache = ResponseCache::new(backend, response_cache_config(&config.cache));
            info!(backend = cache.backend_name(), "Response cache enabled");
            Some(Arc::new(cache))
        } else {
            info!("Response cache disabled");
            None
        };

        let identity = build_identity_extractor(&config.auth)?;

        let rate_limiter = config
            .rate_limit
            .enabled
            .then(|| Arc::new(RateLimiter::from_config(&config.rate_limit)));

        let dispatcher = Arc::new(ProxyDispatcher::new(
            Arc::clone(&routes),
            Arc::clone(&breakers),
            cache.clone(),
            Arc::clone(&metrics),
        ));

        info!(
            routes = routes.len(),
            identity = identity.name(),
            rate_limit = rate_limiter.is_some(),
            "Application state ready"
        );

        Ok(AppState {
            config: Arc::new(config),
            routes,
            breakers,
            cache,
            dispatcher,
            identity,
            rate_limiter,
            metrics,
            started_at: Instant::now(),
        })
    }
}

/// Breaker, retry and fallback for one service
fn build_breaker(service: &ServiceConfig, executor: Arc<dyn BackendExecutor>) -> CircuitBreaker {
    let b = &service.breaker;
    let breaker_config = CircuitBreakerConfig {
        failure_rate_threshold: b.failure_rate_threshold,
        min_requests: b.min_requests,
        window: b.window,
        window_buckets: b.window_buckets,
        reset_timeout: b.reset_timeout,
        call_timeout: b.call_timeout,
    };

    let r = &service.retry;
    let retry = RetryPolicy::new(RetryConfig {
        max_attempts: r.max_attempts,
        min_delay: r.min_delay,
        max_delay: r.max_delay,
        factor: r.factor,
        jitter: r.jitter,
    });

    let fallback = resolve_fallback(
        &service.name,
        service.resource_class,
        service
            .fallback
            .as_ref()
            .map(|f| (f.status, f.body.clone())),
    );

    CircuitBreaker::new(&service.name, breaker_config, retry, executor, fallback)
}

fn build_cache_backend(config: &CacheConfig) -> GatewayResult<Arc<dyn CacheBackend>> {
    match config.redis_url.as_deref() {
        Some(url) => {
            let backend = RedisCacheBackend::new(url, config.operation_timeout)
                .map_err(|e| GatewayError::configuration(e.to_string()))?;
            Ok(Arc::new(backend))
        }
        None => Ok(Arc::new(MemoryCacheBackend::new(config.max_entries))),
    }
}

fn response_cache_config(config: &CacheConfig) -> ResponseCacheConfig {
    ResponseCacheConfig {
        key_prefix: config.key_prefix.clone(),
        ttl: TtlPolicy {
            user: config.ttl.user,
            review: config.ttl.review,
            watchlist: config.ttl.watchlist,
            default: config.ttl.default,
        },
    }
}
