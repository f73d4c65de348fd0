//! Cache backend abstraction.
//!
//! Provides a cache backend abstraction that supports:
//! - In-memory caching (default, single-instance)
//! - Redis caching (distributed, multi-instance), see [`crate::redis_cache`]
//!
//! Backends store opaque bytes under fully-qualified keys. Patterns use
//! Redis glob syntax (`*`, `?`, `[...]`, `\` escapes) on every backend.

use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;

/// Error types for cache backend operations
#[derive(Debug, Error)]
pub enum DistributedCacheError {
    /// Connection error
    #[error("Cache connection error: {0}")]
    ConnectionError(String),

    /// Command failed on the backend
    #[error("Cache backend error: {0}")]
    BackendError(String),

    /// Operation timeout
    #[error("Cache operation timeout after {0:?}")]
    Timeout(Duration),

    /// Configuration error
    #[error("Cache configuration error: {0}")]
    ConfigError(String),
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, DistributedCacheError>;

/// Cache backend trait for polymorphic cache implementations
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get a value from the cache
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Set a value in the cache with TTL
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()>;

    /// Delete a key from the cache
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Delete all keys matching a glob pattern, returning how many went
    async fn delete_pattern(&self, pattern: &str) -> CacheResult<u64>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> CacheResult<()>;

    /// Get backend name for metrics
    fn name(&self) -> &'static str;

    /// Check if backend state is shared between gateway instances
    fn is_distributed(&self) -> bool;
}

/// Escape glob metacharacters so `value` matches only itself
#[must_use]
pub fn escape_glob(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Compile a Redis-style glob into an anchored regex
pub fn glob_to_regex(pattern: &str) -> CacheResult<Regex> {
    let mut re = String::with_capacity(pattern.len() * 2 + 2);
    re.push('^');
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            '\\' => {
                if let Some(next) = chars.next() {
                    re.push_str(&regex::escape(&next.to_string()));
                }
            }
            '[' => {
                re.push('[');
                for inner in chars.by_ref() {
                    if inner == ']' {
                        break;
                    }
                    if inner == '\\' || inner == '[' {
                        re.push('\\');
                    }
                    re.push(inner);
                }
                re.push(']');
            }
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| DistributedCacheError::ConfigError(format!("bad pattern: {e}")))
}

/// Local cache entry with instant-based expiry
#[derive(Debug)]
struct LocalCacheEntry {
    data: Vec<u8>,
    expires_at: Instant,
    hits: u64,
}

impl LocalCacheEntry {
    fn new(data: Vec<u8>, ttl: Duration) -> Self {
        Self {
            data,
            expires_at: Instant::now() + ttl,
            hits: 0,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-memory cache backend for single-instance deployments
pub struct MemoryCacheBackend {
    entries: RwLock<HashMap<String, LocalCacheEntry>>,
    max_entries: usize,
}

impl MemoryCacheBackend {
    /// Create a new memory cache backend holding at most `max_entries`
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    /// Number of live and not-yet-evicted entries
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the backend holds no entries
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Evict expired entries, then the least-hit ones, to make room for one
    fn evict_if_needed(&self, entries: &mut HashMap<String, LocalCacheEntry>) {
        entries.retain(|_, entry| !entry.is_expired());

        if entries.len() >= self.max_entries {
            let to_remove = entries.len() - self.max_entries + 1;
            let mut hit_counts: Vec<(String, u64)> = entries
                .iter()
                .map(|(k, v)| (k.clone(), v.hits))
                .collect();
            hit_counts.sort_by_key(|(_, hits)| *hits);

            for (key, _) in hit_counts.into_iter().take(to_remove) {
                entries.remove(&key);
            }
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut entries = self.entries.write().await;

        if let Some(entry) = entries.get_mut(key) {
            if entry.is_expired() {
                entries.remove(key);
                return Ok(None);
            }
            entry.hits += 1;
            return Ok(Some(entry.data.clone()));
        }

        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        let mut entries = self.entries.write().await;
        if !entries.contains_key(key) {
            self.evict_if_needed(&mut entries);
        }
        entries.insert(key.to_string(), LocalCacheEntry::new(value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> CacheResult<u64> {
        let matcher = glob_to_regex(pattern)?;
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|k, _| !matcher.is_match(k));
        Ok((before - entries.len()) as u64)
    }

    async fn health_check(&self) -> CacheResult<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }

    fn is_distributed(&self) -> bool {
        false
    }
}
