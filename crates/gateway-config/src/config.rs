//! Configuration model.
//!
//! Every section has serde defaults, so an empty document yields a working
//! gateway that fronts the three default services on localhost.

use gateway_core::ResourceClass;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;
use validator::Validate;

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP listener settings
    #[validate(nested)]
    pub server: ServerConfig,
    /// Proxied backend services, in declaration order
    #[validate(nested)]
    pub services: Vec<ServiceConfig>,
    /// Response cache settings
    #[validate(nested)]
    pub cache: CacheConfig,
    /// Identity extraction settings
    pub auth: AuthConfig,
    /// Rate limiting settings
    #[validate(nested)]
    pub rate_limit: RateLimitConfig,
    /// Logging and metrics settings
    pub telemetry: TelemetryConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            services: default_services(),
            cache: CacheConfig::default(),
            auth: AuthConfig::default(),
            rate_limit: RateLimitConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Look up a service by name
    #[must_use]
    pub fn service(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.name == name)
    }
}

fn default_services() -> Vec<ServiceConfig> {
    vec![
        ServiceConfig::new("user", "/api/users", "http://localhost:3001")
            .with_resource_class(ResourceClass::User),
        ServiceConfig::new("review", "/api/reviews", "http://localhost:3002")
            .with_resource_class(ResourceClass::Review),
        ServiceConfig::new("watchlist", "/api/watchlist", "http://localhost:3003")
            .with_resource_class(ResourceClass::Watchlist),
    ]
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    #[validate(length(min = 1))]
    pub host: String,
    /// Bind port
    #[validate(range(min = 1))]
    pub port: u16,
    /// Overall deadline for one inbound request
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Time allowed for in-flight requests after a shutdown signal
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// One proxied backend service
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServiceConfig {
    /// Unique service name, used in logs, metrics and env overrides
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    /// Path prefix routed to this service, e.g. `/api/users`
    #[validate(length(min = 2))]
    pub prefix: String,
    /// Backend base URL. A route without one is treated as unroutable.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Resource family served by the backend
    #[serde(default)]
    pub resource_class: ResourceClass,
    /// Backend path probed by `/health/details`
    #[serde(default = "default_health_path")]
    pub health_path: String,
    /// Circuit breaker tuning
    #[serde(default)]
    #[validate(nested)]
    pub breaker: BreakerSettings,
    /// Retry tuning
    #[serde(default)]
    #[validate(nested)]
    pub retry: RetrySettings,
    /// Static response served while the breaker is open
    #[serde(default)]
    pub fallback: Option<FallbackSettings>,
}

fn default_health_path() -> String {
    "/health".to_string()
}

impl ServiceConfig {
    /// Create a service with default tuning
    pub fn new(
        name: impl Into<String>,
        prefix: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            prefix: prefix.into(),
            base_url: Some(base_url.into()),
            resource_class: ResourceClass::Generic,
            health_path: default_health_path(),
            breaker: BreakerSettings::default(),
            retry: RetrySettings::default(),
            fallback: None,
        }
    }

    /// Set the resource class
    #[must_use]
    pub fn with_resource_class(mut self, class: ResourceClass) -> Self {
        self.resource_class = class;
        self
    }

    /// Set the breaker tuning
    #[must_use]
    pub fn with_breaker(mut self, breaker: BreakerSettings) -> Self {
        self.breaker = breaker;
        self
    }

    /// Set the retry tuning
    #[must_use]
    pub fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    /// Set the fallback payload
    #[must_use]
    pub fn with_fallback(mut self, fallback: FallbackSettings) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Env variable that overrides `base_url`, e.g. `USER_SERVICE_URL`
    #[must_use]
    pub fn url_env_key(&self) -> String {
        let name: String = self
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();
        format!("{name}_SERVICE_URL")
    }
}

/// Circuit breaker tuning for one service
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct BreakerSettings {
    /// Failure percentage the window must exceed to open the breaker
    #[validate(range(min = 1.0, exclusive_max = 100.0))]
    pub failure_rate_threshold: f64,
    /// Samples required in the window before the rate is evaluated
    #[validate(range(min = 1))]
    pub min_requests: u32,
    /// Rolling window length
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    /// Number of buckets the window is split into
    #[validate(range(min = 1, max = 600))]
    pub window_buckets: u32,
    /// Time spent open before a probe is allowed
    #[serde(with = "humantime_serde")]
    pub reset_timeout: Duration,
    /// Deadline for a single outbound attempt
    #[serde(with = "humantime_serde")]
    pub call_timeout: Duration,
}

impl Default for BreakerSettings {
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

/// Retry tuning for one service
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts, including the first
    #[validate(range(min = 1, max = 10))]
    pub max_attempts: u32,
    /// Delay before the second attempt
    #[serde(with = "humantime_serde")]
    pub min_delay: Duration,
    /// Upper bound for any single delay
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Exponential backoff factor
    #[validate(range(min = 1.0, max = 10.0))]
    pub factor: f64,
    /// Jitter as a fraction of the computed delay
    #[validate(range(min = 0.0, max = 1.0))]
    pub jitter: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
            jitter: 0.1,
        }
    }
}

/// Static fallback payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackSettings {
    /// HTTP status
    #[serde(default = "default_fallback_status")]
    pub status: u16,
    /// JSON body
    pub body: serde_json::Value,
}

fn default_fallback_status() -> u16 {
    503
}

/// Response cache settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CacheConfig {
    /// Master switch
    pub enabled: bool,
    /// Redis URL. The in-memory backend is used when absent.
    pub redis_url: Option<String>,
    /// Prefix prepended to every stored key
    #[validate(length(max = 64))]
    pub key_prefix: String,
    /// Entry cap for the in-memory backend
    #[validate(range(min = 1))]
    pub max_entries: usize,
    /// Interval of the background connectivity check
    #[serde(with = "humantime_serde")]
    pub health_check_interval: Duration,
    /// Deadline for a single cache round-trip
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,
    /// Per-resource-class TTLs
    pub ttl: CacheTtlConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            redis_url: None,
            key_prefix: "gateway:".to_string(),
            max_entries: 10_000,
            health_check_interval: Duration::from_secs(10),
            operation_timeout: Duration::from_millis(500),
            ttl: CacheTtlConfig::default(),
        }
    }
}

/// Cache TTL per resource class
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheTtlConfig {
    /// User profiles
    #[serde(with = "humantime_serde")]
    pub user: Duration,
    /// Reviews
    #[serde(with = "humantime_serde")]
    pub review: Duration,
    /// Watchlists
    #[serde(with = "humantime_serde")]
    pub watchlist: Duration,
    /// Everything else
    #[serde(with = "humantime_serde")]
    pub default: Duration,
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            user: Duration::from_secs(3600),
            review: Duration::from_secs(1200),
            watchlist: Duration::from_secs(900),
            default: Duration::from_secs(300),
        }
    }
}

impl CacheTtlConfig {
    /// TTL for a resource class
    #[must_use]
    pub fn for_class(&self, class: ResourceClass) -> Duration {
        match class {
            ResourceClass::User => self.user,
            ResourceClass::Review => self.review,
            ResourceClass::Watchlist => self.watchlist,
            ResourceClass::Generic => self.default,
        }
    }
}

/// How the caller identity is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// HS256 bearer token
    #[default]
    Jwt,
    /// Header set by a trusted upstream authenticator
    Header,
    /// Every request is anonymous
    None,
}

/// Identity extraction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Extraction mode
    pub mode: AuthMode,
    /// HMAC secret for bearer tokens
    pub jwt_secret: Option<String>,
    /// Claim holding the principal id
    pub principal_claim: String,
    /// Expected `iss`, if any
    pub issuer: Option<String>,
    /// Expected `aud`, if any
    pub audience: Option<String>,
    /// Header read in `header` mode
    pub principal_header: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::Jwt,
            jwt_secret: None,
            principal_claim: "sub".to_string(),
            issuer: None,
            audience: None,
            principal_header: "x-user-id".to_string(),
        }
    }
}

/// Per-client token bucket settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Master switch
    pub enabled: bool,
    /// Sustained refill rate
    #[validate(range(min = 1))]
    pub requests_per_second: u32,
    /// Bucket capacity
    #[validate(range(min = 1))]
    pub burst: u32,
    /// Upper bound on tracked clients. New clients past it share one bucket.
    #[validate(range(min = 1))]
    pub max_clients: usize,
    /// Peers whose `X-Forwarded-For` header is believed. Anyone else is
    /// limited by their socket address.
    pub trusted_proxies: Vec<IpAddr>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_second: 100,
            burst: 200,
            max_clients: 10_000,
            trusted_proxies: Vec::new(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Logging and metrics settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub log_level: String,
    /// Output format
    pub log_format: LogFormat,
    /// Expose `/metrics`
    pub metrics_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
        }
    }
}
