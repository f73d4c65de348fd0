//! # Gateway Resilience
//!
//! Resilience patterns for the edge gateway:
//! - Outbound HTTP executor
//! - Retry policy with exponential backoff
//! - Per-service circuit breaker over a rolling window, with static fallbacks
//! - Fail-open response cache over memory or Redis backends

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod circuit_breaker;
pub mod distributed_cache;
pub mod executor;
pub mod fallback;
pub mod redis_cache;
pub mod registry;
pub mod response_cache;
pub mod retry;
pub mod window;

// Re-export main types
pub use circuit_breaker::{
    BreakerEvent, BreakerObserver, BreakerSignal, CircuitBreaker, CircuitBreakerConfig,
    CircuitBreakerStats, CircuitState, LoggingObserver,
};
pub use distributed_cache::{
    CacheBackend, CacheResult, DistributedCacheError, MemoryCacheBackend,
};
pub use executor::{HttpExecutor, HttpExecutorConfig};
pub use fallback::{default_fallback, resolve_fallback};
pub use redis_cache::RedisCacheBackend;
pub use registry::BreakerRegistry;
pub use response_cache::{
    encode_principal, is_cacheable_path, CacheStats, CachedResponse, ResponseCache,
    ResponseCacheConfig, TtlPolicy,
};
pub use retry::{RetryConfig, RetryPolicy, RetryPolicyBuilder, RetryResult};
pub use window::{RollingWindow, WindowSnapshot};
