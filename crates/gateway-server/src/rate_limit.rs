//! Per-client token bucket rate limiting.

use crate::{error::ApiError, identity::Identity};
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use gateway_config::RateLimitConfig;
use gateway_core::Principal;
use gateway_telemetry::GatewayMetrics;
use http::HeaderMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Bucket shared by every client admitted after the map is full
const OVERFLOW_KEY: &str = "overflow";

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    updated: Instant,
}

/// Token bucket limiter keyed by client.
///
/// At most `max_clients` buckets are tracked, plus the shared overflow
/// bucket. Idle buckets are swept when the map fills up.
#[derive(Debug)]
pub struct RateLimiter {
    rate: f64,
    burst: f64,
    max_clients: usize,
    trusted_proxies: Vec<IpAddr>,
    buckets: DashMap<String, Bucket>,
}

impl RateLimiter {
    /// `rate` tokens per second, holding at most `burst`
    pub fn new(rate: u32, burst: u32) -> Self {
        Self {
            rate: f64::from(rate.max(1)),
            burst: f64::from(burst.max(1)),
            max_clients: 10_000,
            trusted_proxies: Vec::new(),
            buckets: DashMap::new(),
        }
    }

    /// Cap the number of tracked clients
    #[must_use]
    pub fn with_max_clients(mut self, max_clients: usize) -> Self {
        self.max_clients = max_clients.max(1);
        self
    }

    /// Believe `X-Forwarded-For` only from these peers
    #[must_use]
    pub fn with_trusted_proxies(mut self, proxies: Vec<IpAddr>) -> Self {
        self.trusted_proxies = proxies;
        self
    }

    /// Build from configuration
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.requests_per_second, config.burst)
            .with_max_clients(config.max_clients)
            .with_trusted_proxies(config.trusted_proxies.clone())
    }

    /// Bucket key for a caller: the principal when known, else the peer
    /// address. A trusted proxy peer is replaced by the first well-formed
    /// `X-Forwarded-For` address.
    pub fn client_key(
        &self,
        principal: Option<&Principal>,
        peer: Option<IpAddr>,
        headers: &HeaderMap,
    ) -> String {
        if let Some(principal) = principal {
            return format!("principal:{}", principal.as_str());
        }
        let Some(peer) = peer else {
            return "anonymous".to_string();
        };

        if self.trusted_proxies.contains(&peer) {
            let forwarded = headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .and_then(|v| v.trim().parse::<IpAddr>().ok());
            if let Some(client) = forwarded {
                return format!("ip:{client}");
            }
        }
        format!("ip:{peer}")
    }

    /// Take one token for `client`. On exhaustion returns how long until
    /// the next token.
    pub fn check(&self, client: &str) -> Result<(), Duration> {
        let now = Instant::now();
        let key = self.admit(client, now);

        let mut bucket = self.buckets.entry(key.to_string()).or_insert(Bucket {
            tokens: self.burst,
            updated: now,
        });

        let elapsed = now.saturating_duration_since(bucket.updated).as_secs_f64();
        bucket.tokens = elapsed.mul_add(self.rate, bucket.tokens).min(self.burst);
        bucket.updated = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - bucket.tokens;
            Err(Duration::from_secs_f64(missing / self.rate))
        }
    }

    /// Number of clients currently tracked
    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }

    /// Key to charge: the client's own bucket, or the overflow bucket when
    /// the map is full of active clients
    fn admit<'a>(&self, client: &'a str, now: Instant) -> &'a str {
        if self.buckets.contains_key(client) || self.tracked() < self.max_clients {
            return client;
        }
        self.sweep(now);
        if self.tracked() < self.max_clients {
            client
        } else {
            warn!(max_clients = self.max_clients, "Rate limiter full, using overflow bucket");
            OVERFLOW_KEY
        }
    }

    fn tracked(&self) -> usize {
        self.buckets.len() - usize::from(self.buckets.contains_key(OVERFLOW_KEY))
    }

    /// Drop buckets that would be full again by now
    fn sweep(&self, now: Instant) {
        let refill = Duration::from_secs_f64(self.burst / self.rate);
        self.buckets
            .retain(|_, b| now.saturating_duration_since(b.updated) < refill);
    }
}

/// State handed to [`rate_limit_middleware`]
#[derive(Clone)]
pub struct RateLimitState {
    /// Limiter
    pub limiter: Arc<RateLimiter>,
    /// Rejections are counted here
    pub metrics: Arc<GatewayMetrics>,
}

/// Reject callers over their budget with 429. Keyed by principal when
/// known, else by client address.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let principal = request
        .extensions()
        .get::<Identity>()
        .and_then(|identity| identity.0.as_ref());
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip());
    let key = state.limiter.client_key(principal, peer, request.headers());

    if let Err(retry_after) = state.limiter.check(&key) {
        debug!(client = %key, retry_after_ms = retry_after.as_millis() as u64, "Rate limited");
        state.metrics.record_rate_limited();
        return ApiError::too_many_requests(retry_after).into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn forwarded(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_str(value).unwrap());
        headers
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_refill() {
        let limiter = RateLimiter::new(2, 3);
        for _ in 0..3 {
            assert!(limiter.check("c1").is_ok());
        }
        let wait = limiter.check("c1").unwrap_err();
        assert!(wait <= Duration::from_millis(500));

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(limiter.check("c1").is_ok());
        assert!(limiter.check("c1").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clients_are_independent() {
        let limiter = RateLimiter::new(1, 1);
        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("a").is_err());
        assert!(limiter.check("b").is_ok());
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_drops_idle_buckets() {
        let limiter = RateLimiter::new(10, 10);
        limiter.check("idle").unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        limiter.sweep(Instant::now());
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn test_client_key_prefers_principal() {
        let limiter = RateLimiter::new(1, 1);
        let principal = Principal::new("u1").unwrap();
        let peer = Some(ip("10.0.0.9"));
        let key = limiter.client_key(Some(&principal), peer, &HeaderMap::new());
        assert_eq!(key, "principal:u1");
        assert_eq!(limiter.client_key(None, None, &HeaderMap::new()), "anonymous");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotating_forwarded_for_shares_peer_budget() {
        let limiter = RateLimiter::new(1, 1);
        let peer = Some(ip("203.0.113.7"));

        for i in 0..5 {
            let key = limiter.client_key(None, peer, &forwarded(&format!("198.51.100.{i}")));
            assert_eq!(key, "ip:203.0.113.7");
            assert_eq!(limiter.check(&key).is_ok(), i == 0);
        }
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn test_forwarded_for_trusted_only_from_proxies() {
        let limiter = RateLimiter::new(1, 1).with_trusted_proxies(vec![ip("10.0.0.1")]);

        let proxy = Some(ip("10.0.0.1"));
        let key = limiter.client_key(None, proxy, &forwarded("198.51.100.4, 10.0.0.1"));
        assert_eq!(key, "ip:198.51.100.4");

        // malformed entry falls back to the proxy address
        let key = limiter.client_key(None, proxy, &forwarded("not-an-ip"));
        assert_eq!(key, "ip:10.0.0.1");

        let key = limiter.client_key(None, Some(ip("10.0.0.2")), &forwarded("198.51.100.4"));
        assert_eq!(key, "ip:10.0.0.2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_clients_past_cap_share_overflow_bucket() {
        let limiter = RateLimiter::new(1, 1).with_max_clients(2);
        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("b").is_ok());

        assert!(limiter.check("c").is_ok());
        assert!(limiter.check("d").is_err());
        assert!(limiter.check("e").is_err());
        assert_eq!(limiter.tracked_clients(), 3);

        // known clients keep their own bucket
        assert!(limiter.check("a").is_err());

        // once idle buckets refill they are swept and new clients get their own
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(limiter.check("f").is_ok());
        assert!(limiter.check("f").is_err());
        assert!(limiter.check("g").is_ok());
    }
}
