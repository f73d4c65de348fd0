//! Fail-open response cache.
//!
//! Wraps a [`CacheBackend`] with the gateway's key scheme, TTL policy and
//! invalidation scopes. Nothing here ever fails a request: backend errors
//! are logged, counted, and clear the `connected` flag. While the flag is
//! clear every operation is a no-op. A background monitor pings the backend
//! and sets the flag again once it answers.

use crate::distributed_cache::{escape_glob, CacheBackend, DistributedCacheError};
use chrono::{DateTime, Utc};
use gateway_core::{BackendResponse, Principal, ResourceClass};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// TTL per resource class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    /// User profiles
    pub user: Duration,
    /// Reviews
    pub review: Duration,
    /// Watchlists
    pub watchlist: Duration,
    /// Everything else
    pub default: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            user: Duration::from_secs(3600),
            review: Duration::from_secs(1200),
            watchlist: Duration::from_secs(900),
            default: Duration::from_secs(300),
        }
    }
}

impl TtlPolicy {
    /// TTL for a resource class
    #[must_use]
    pub fn ttl_for(&self, class: ResourceClass) -> Duration {
        match class {
            ResourceClass::User => self.user,
            ResourceClass::Review => self.review,
            ResourceClass::Watchlist => self.watchlist,
            ResourceClass::Generic => self.default,
        }
    }
}

/// Response cache configuration
#[derive(Debug, Clone)]
pub struct ResponseCacheConfig {
    /// Prefix prepended to every key
    pub key_prefix: String,
    /// TTLs
    pub ttl: TtlPolicy,
}

impl Default for ResponseCacheConfig {
    fn default() -> Self {
        Self {
            key_prefix: "gateway:".to_string(),
            ttl: TtlPolicy::default(),
        }
    }
}

/// Stored representation of a backend response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// HTTP status
    pub status: u16,
    /// Backend content type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Raw body
    #[serde(with = "base64_body")]
    pub body: Vec<u8>,
    /// Store time
    pub cached_at: DateTime<Utc>,
}

impl CachedResponse {
    /// Snapshot a backend response
    #[must_use]
    pub fn from_response(response: &BackendResponse) -> Self {
        Self {
            status: response.status,
            content_type: response.content_type.clone(),
            body: response.body.to_vec(),
            cached_at: Utc::now(),
        }
    }

    /// Rebuild a backend response
    #[must_use]
    pub fn into_response(self) -> BackendResponse {
        BackendResponse::new(self.status, self.content_type, self.body)
    }
}

mod base64_body {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups that found an entry
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// Successful stores
    pub writes: u64,
    /// Keys removed by invalidation
    pub invalidated: u64,
    /// Backend errors
    pub errors: u64,
    /// Operations skipped while disconnected
    pub skipped: u64,
}

impl CacheStats {
    /// Hit percentage over all lookups
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    invalidated: AtomicU64,
    errors: AtomicU64,
    skipped: AtomicU64,
}

/// Paths that never touch the cache
#[must_use]
pub fn is_cacheable_path(path: &str) -> bool {
    let meta = path == "/metrics"
        || path == "/health"
        || path.starts_with("/health/")
        || path.ends_with("/health")
        || path.contains("/health/");
    !meta
}

/// Key segment for a principal id: `%`, `:` and `/` are percent-encoded
#[must_use]
pub fn encode_principal(principal: &Principal) -> String {
    let id = principal.as_str();
    let mut encoded = String::with_capacity(id.len());
    for c in id.chars() {
        match c {
            '%' => encoded.push_str("%25"),
            ':' => encoded.push_str("%3A"),
            '/' => encoded.push_str("%2F"),
            other => encoded.push(other),
        }
    }
    encoded
}

/// Fail-open response cache
pub struct ResponseCache {
    backend: Arc<dyn CacheBackend>,
    config: ResponseCacheConfig,
    connected: AtomicBool,
    counters: Counters,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl ResponseCache {
    /// Wrap a backend. The cache starts connected; the first failure or
    /// health check corrects that.
    #[must_use]
    pub fn new(backend: Arc<dyn CacheBackend>, config: ResponseCacheConfig) -> Self {
        Self {
            backend,
            config,
            connected: AtomicBool::new(true),
            counters: Counters::default(),
        }
    }

    /// Backend name
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Whether operations currently reach the backend
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn set_connected(&self, connected: bool) {
        let was = self.connected.swap(connected, Ordering::AcqRel);
        if was != connected {
            if connected {
                info!(backend = self.backend.name(), "Cache backend connected");
            } else {
                warn!(backend = self.backend.name(), "Cache backend disconnected, caching disabled");
            }
        }
    }

    fn on_error(&self, op: &str, key: &str, err: &DistributedCacheError) {
        self.counters.errors.fetch_add(1, Ordering::Relaxed);
        warn!(
            backend = self.backend.name(),
            operation = op,
            key = %key,
            error = %err,
            "Cache operation failed"
        );
        self.set_connected(false);
    }

    fn skip(&self) -> bool {
        if self.is_connected() {
            false
        } else {
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            true
        }
    }

    /// TTL for a resource class
    #[must_use]
    pub fn ttl_for(&self, class: ResourceClass) -> Duration {
        self.config.ttl.ttl_for(class)
    }

    /// Storage key: `{prefix}{principal}:{url}`, or `{prefix}{url}` for
    /// anonymous callers.
    ///
    /// The principal segment is percent-encoded (see [`encode_principal`]),
    /// so it never contains `:` or `/`. The first `:` after the prefix always
    /// ends the principal, and anonymous keys (whose URL starts with `/`)
    /// cannot collide with a principal's.
    #[must_use]
    pub fn cache_key(&self, principal: Option<&Principal>, request_url: &str) -> String {
        match principal {
            Some(p) => format!(
                "{}{}:{request_url}",
                self.config.key_prefix,
                encode_principal(p)
            ),
            None => format!("{}{request_url}", self.config.key_prefix),
        }
    }

    /// Pattern matching everything a principal may have cached after
    /// mutating a resource of `class` under `route_prefix`.
    ///
    /// User resources carry profile data that shows up across services, so
    /// a user mutation drops every entry of that principal. Other classes
    /// only drop entries under their own route prefix.
    #[must_use]
    pub fn invalidation_pattern(
        &self,
        principal: &Principal,
        class: ResourceClass,
        route_prefix: &str,
    ) -> String {
        let prefix = escape_glob(&self.config.key_prefix);
        let principal = escape_glob(&encode_principal(principal));
        match class {
            ResourceClass::User => format!("{prefix}{principal}:*"),
            _ => format!("{prefix}{principal}:{}*", escape_glob(route_prefix)),
        }
    }

    /// Look up a key. Misses, errors, undecodable entries and a
    /// disconnected backend all yield `None`.
    pub async fn get(&self, key: &str) -> Option<CachedResponse> {
        if self.skip() {
            return None;
        }

        match self.backend.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<CachedResponse>(&bytes) {
                Ok(cached) => {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %key, "Cache HIT");
                    Some(cached)
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Dropping undecodable cache entry");
                    self.counters.misses.fetch_add(1, Ordering::Relaxed);
                    if let Err(e) = self.backend.delete(key).await {
                        self.on_error("delete", key, &e);
                    }
                    None
                }
            },
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Cache MISS");
                None
            }
            Err(e) => {
                self.on_error("get", key, &e);
                None
            }
        }
    }

    /// Store a response. Returns whether it was written.
    pub async fn set(&self, key: &str, value: &CachedResponse, ttl: Duration) -> bool {
        if self.skip() {
            return false;
        }

        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "Failed to serialize cache entry");
                return false;
            }
        };

        match self.backend.set(key, bytes, ttl).await {
            Ok(()) => {
                self.counters.writes.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, ttl_secs = ttl.as_secs(), "Cache SET");
                true
            }
            Err(e) => {
                self.on_error("set", key, &e);
                false
            }
        }
    }

    /// Remove every key matching a glob pattern. Returns the count removed.
    pub async fn invalidate_pattern(&self, pattern: &str) -> u64 {
        if self.skip() {
            return 0;
        }

        match self.backend.delete_pattern(pattern).await {
            Ok(removed) => {
                self.counters.invalidated.fetch_add(removed, Ordering::Relaxed);
                debug!(pattern = %pattern, removed = removed, "Cache invalidated");
                removed
            }
            Err(e) => {
                self.on_error("delete_pattern", pattern, &e);
                0
            }
        }
    }

    /// Drop a principal's entries after a successful mutation
    pub async fn invalidate_for(
        &self,
        principal: &Principal,
        class: ResourceClass,
        route_prefix: &str,
    ) -> u64 {
        let pattern = self.invalidation_pattern(principal, class, route_prefix);
        self.invalidate_pattern(&pattern).await
    }

    /// Ping the backend and update the `connected` flag
    pub async fn check_health(&self) -> bool {
        match self.backend.health_check().await {
            Ok(()) => {
                self.set_connected(true);
                true
            }
            Err(e) => {
                debug!(backend = self.backend.name(), error = %e, "Cache health check failed");
                self.set_connected(false);
                false
            }
        }
    }

    /// Spawn the background connectivity monitor
    pub fn spawn_monitor(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                cache.check_health().await;
            }
        })
    }

    /// Counter snapshot
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            invalidated: self.counters.invalidated.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributed_cache::{CacheResult, MemoryCacheBackend};
    use async_trait::async_trait;

    /// Backend whose availability can be toggled
    struct FlakyBackend {
        inner: MemoryCacheBackend,
        up: AtomicBool,
    }

    impl FlakyBackend {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                inner: MemoryCacheBackend::new(100),
                up: AtomicBool::new(true),
            })
        }

        fn check(&self) -> CacheResult<()> {
            if self.up.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(DistributedCacheError::ConnectionError("down".to_string()))
            }
        }
    }

    #[async_trait]
    impl CacheBackend for FlakyBackend {
        async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
            self.check()?;
            self.inner.get(key).await
        }
        async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
            self.check()?;
            self.inner.set(key, value, ttl).await
        }
        async fn delete(&self, key: &str) -> CacheResult<()> {
            self.check()?;
            self.inner.delete(key).await
        }
        async fn delete_pattern(&self, pattern: &str) -> CacheResult<u64> {
            self.check()?;
            self.inner.delete_pattern(pattern).await
        }
        async fn health_check(&self) -> CacheResult<()> {
            self.check()
        }
        fn name(&self) -> &'static str {
            "flaky"
        }
        fn is_distributed(&self) -> bool {
            false
        }
    }

    fn memory_cache() -> ResponseCache {
        ResponseCache::new(
            Arc::new(MemoryCacheBackend::new(100)),
            ResponseCacheConfig::default(),
        )
    }

    fn entry(body: &str) -> CachedResponse {
        CachedResponse::from_response(&BackendResponse::new(
            200,
            Some("application/json".to_string()),
            body.to_string(),
        ))
    }

    fn principal(id: &str) -> Principal {
        Principal::new(id).unwrap()
    }

    #[test]
    fn test_cache_keys() {
        let cache = memory_cache();
        assert_eq!(
            cache.cache_key(Some(&principal("u1")), "/api/users/1?x=1"),
            "gateway:u1:/api/users/1?x=1"
        );
        assert_eq!(cache.cache_key(None, "/api/users/1"), "gateway:/api/users/1");
    }

    #[test]
    fn test_invalidation_scope() {
        let cache = memory_cache();
        let u1 = principal("u1");
        assert_eq!(
            cache.invalidation_pattern(&u1, ResourceClass::User, "/api/users"),
            "gateway:u1:*"
        );
        assert_eq!(
            cache.invalidation_pattern(&u1, ResourceClass::Review, "/api/reviews"),
            "gateway:u1:/api/reviews*"
        );
        let sneaky = principal("u*");
        assert_eq!(
            cache.invalidation_pattern(&sneaky, ResourceClass::User, "/api/users"),
            "gateway:u\\*:*"
        );
    }

    #[test]
    fn test_principal_segment_is_encoded() {
        let cache = memory_cache();
        assert_eq!(encode_principal(&principal("a:b/c%d")), "a%3Ab%2Fc%25d");

        // principal "a" asking for "x:/api/users/1" vs principal "a:/api/users/x"
        // asking for "/api/users/1"
        let first = cache.cache_key(Some(&principal("a")), "/api/users/x:/api/users/1");
        let second = cache.cache_key(Some(&principal("a:/api/users/x")), "/api/users/1");
        assert_ne!(first, second);

        let named = cache.cache_key(Some(&principal("/api/users/1")), "/x");
        let anonymous = cache.cache_key(None, "/api/users/1:/x");
        assert_ne!(named, anonymous);

        assert_eq!(
            cache.invalidation_pattern(&principal("u1:admin"), ResourceClass::User, "/api/users"),
            "gateway:u1%3Aadmin:*"
        );
    }

    #[tokio::test]
    async fn test_invalidation_ignores_principal_with_shared_prefix() {
        let cache = memory_cache();
        let ttl = Duration::from_secs(60);
        let u1 = principal("u1");
        let admin = principal("u1:admin");

        cache.set(&cache.cache_key(Some(&u1), "/api/users/1"), &entry("a"), ttl).await;
        cache.set(&cache.cache_key(Some(&admin), "/api/users/1"), &entry("b"), ttl).await;

        let removed = cache.invalidate_for(&u1, ResourceClass::User, "/api/users").await;
        assert_eq!(removed, 1);
        assert!(cache.get(&cache.cache_key(Some(&u1), "/api/users/1")).await.is_none());
        let kept = cache.get(&cache.cache_key(Some(&admin), "/api/users/1")).await;
        assert_eq!(&kept.unwrap().into_response().body[..], b"b");

        let removed = cache.invalidate_for(&admin, ResourceClass::User, "/api/users").await;
        assert_eq!(removed, 1);
    }

    #[test]
    fn test_ttl_policy() {
        let cache = memory_cache();
        assert_eq!(cache.ttl_for(ResourceClass::User), Duration::from_secs(3600));
        assert_eq!(cache.ttl_for(ResourceClass::Review), Duration::from_secs(1200));
        assert_eq!(cache.ttl_for(ResourceClass::Watchlist), Duration::from_secs(900));
        assert_eq!(cache.ttl_for(ResourceClass::Generic), Duration::from_secs(300));
    }

    #[test]
    fn test_health_paths_not_cacheable() {
        assert!(!is_cacheable_path("/health"));
        assert!(!is_cacheable_path("/health/details"));
        assert!(!is_cacheable_path("/api/users/health"));
        assert!(!is_cacheable_path("/metrics"));
        assert!(is_cacheable_path("/api/users/42"));
        assert!(is_cacheable_path("/api/healthy-recipes"));
    }

    #[test]
    fn test_cached_response_serde() {
        let cached = CachedResponse {
            status: 200,
            content_type: None,
            body: vec![0, 159, 146, 150],
            cached_at: Utc::now(),
        };
        let json = serde_json::to_value(&cached).unwrap();
        assert!(json["body"].is_string());
        let back: CachedResponse = serde_json::from_value(json).unwrap();
        assert_eq!(back, cached);
    }

    #[tokio::test]
    async fn test_get_set_hit_and_miss() {
        let cache = memory_cache();
        let key = cache.cache_key(Some(&principal("u1")), "/api/users/1");

        assert!(cache.get(&key).await.is_none());
        assert!(cache.set(&key, &entry("{}"), Duration::from_secs(60)).await);
        let hit = cache.get(&key).await.unwrap();
        assert_eq!(hit.status, 200);
        assert_eq!(hit.content_type.as_deref(), Some("application/json"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.writes, 1);
        assert!((stats.hit_rate() - 50.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_invalidate_only_touches_principal() {
        let cache = memory_cache();
        let ttl = Duration::from_secs(60);
        let u1 = principal("u1");
        let u2 = principal("u2");

        for url in ["/api/users/1", "/api/reviews/9", "/api/watchlist"] {
            cache.set(&cache.cache_key(Some(&u1), url), &entry("a"), ttl).await;
            cache.set(&cache.cache_key(Some(&u2), url), &entry("b"), ttl).await;
        }
        cache.set(&cache.cache_key(None, "/api/users/1"), &entry("c"), ttl).await;

        let removed = cache
            .invalidate_for(&u1, ResourceClass::Review, "/api/reviews")
            .await;
        assert_eq!(removed, 1);
        assert!(cache.get(&cache.cache_key(Some(&u1), "/api/users/1")).await.is_some());

        let removed = cache.invalidate_for(&u1, ResourceClass::User, "/api/users").await;
        assert_eq!(removed, 2);
        assert!(cache.get(&cache.cache_key(Some(&u2), "/api/users/1")).await.is_some());
        assert!(cache.get(&cache.cache_key(None, "/api/users/1")).await.is_some());
    }

    #[tokio::test]
    async fn test_fail_open_and_recovery() {
        let backend = FlakyBackend::new();
        let cache = ResponseCache::new(backend.clone(), ResponseCacheConfig::default());
        let ttl = Duration::from_secs(60);

        backend.up.store(false, Ordering::SeqCst);
        assert!(!cache.set("k", &entry("x"), ttl).await);
        assert!(!cache.is_connected());

        // Disconnected: no-ops without touching the backend
        backend.up.store(true, Ordering::SeqCst);
        assert!(!cache.set("k", &entry("x"), ttl).await);
        assert!(cache.get("k").await.is_none());
        assert_eq!(cache.invalidate_pattern("*").await, 0);
        assert_eq!(cache.stats().skipped, 3);
        assert_eq!(cache.stats().errors, 1);

        assert!(cache.check_health().await);
        assert!(cache.is_connected());
        assert!(cache.set("k", &entry("x"), ttl).await);
        assert!(cache.get("k").await.is_some());
    }

    #[tokio::test]
    async fn test_monitor_restores_connection() {
        let backend = FlakyBackend::new();
        let cache = Arc::new(ResponseCache::new(backend.clone(), ResponseCacheConfig::default()));

        backend.up.store(false, Ordering::SeqCst);
        assert!(!cache.check_health().await);

        let handle = cache.spawn_monitor(Duration::from_millis(10));
        backend.up.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(cache.is_connected());
        handle.abort();
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_dropped() {
        let backend = Arc::new(MemoryCacheBackend::new(10));
        backend
            .set("gateway:/x", b"not json".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        let cache = ResponseCache::new(backend.clone(), ResponseCacheConfig::default());

        assert!(cache.get("gateway:/x").await.is_none());
        assert!(backend.get("gateway:/x").await.unwrap().is_none());
        assert!(cache.is_connected());
    }
}
