//! Configuration validation.
//!
//! Field-level rules come from the `validator` derives on the config types.
//! The cross-field rules below need the whole document: unique names,
//! non-overlapping prefixes, parsable URLs and sane delay bounds. All
//! problems are collected before failing so one run reports everything.

use crate::config::{AuthMode, GatewayConfig, ServiceConfig};
use crate::error::{ConfigError, ConfigResult};
use std::collections::HashSet;
use url::Url;
use validator::Validate;

/// Validate a fully loaded configuration
pub fn validate_config(config: &GatewayConfig) -> ConfigResult<()> {
    let mut problems = Vec::new();

    if let Err(errors) = config.validate() {
        problems.push(errors.to_string());
    }

    check_services(&config.services, &mut problems);

    if let Some(redis_url) = &config.cache.redis_url {
        match Url::parse(redis_url) {
            Ok(url) if matches!(url.scheme(), "redis" | "rediss") => {}
            Ok(url) => problems.push(format!(
                "cache.redis_url: unsupported scheme '{}'",
                url.scheme()
            )),
            Err(e) => problems.push(format!("cache.redis_url: {e}")),
        }
    }

    if config.auth.mode == AuthMode::Jwt
        && config.auth.jwt_secret.as_deref().is_some_and(str::is_empty)
    {
        problems.push("auth.jwt_secret: must not be empty".to_string());
    }
    if config.auth.mode == AuthMode::Header && config.auth.principal_header.trim().is_empty() {
        problems.push("auth.principal_header: must not be empty".to_string());
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Validation(problems))
    }
}

fn check_services(services: &[ServiceConfig], problems: &mut Vec<String>) {
    let mut names = HashSet::new();

    for svc in services {
        if !names.insert(svc.name.as_str()) {
            problems.push(format!("services: duplicate service name '{}'", svc.name));
        }

        if !svc.prefix.starts_with('/') || svc.prefix.ends_with('/') {
            problems.push(format!(
                "services.{}.prefix: '{}' must start with '/' and must not end with '/'",
                svc.name, svc.prefix
            ));
        }

        if let Some(base_url) = &svc.base_url {
            match Url::parse(base_url) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {}
                Ok(url) => problems.push(format!(
                    "services.{}.base_url: unsupported scheme '{}'",
                    svc.name,
                    url.scheme()
                )),
                Err(e) => problems.push(format!("services.{}.base_url: {e}", svc.name)),
            }
        }

        if svc.retry.min_delay > svc.retry.max_delay {
            problems.push(format!(
                "services.{}.retry: min_delay must not exceed max_delay",
                svc.name
            ));
        }
        if svc.breaker.call_timeout.is_zero() {
            problems.push(format!("services.{}.breaker.call_timeout: must be > 0", svc.name));
        }
        if svc.breaker.reset_timeout.is_zero() {
            problems.push(format!("services.{}.breaker.reset_timeout: must be > 0", svc.name));
        }
        if svc.breaker.window.as_millis() < u128::from(svc.breaker.window_buckets) {
            problems.push(format!(
                "services.{}.breaker.window: too short for {} buckets",
                svc.name, svc.breaker.window_buckets
            ));
        }
        if let Some(fallback) = &svc.fallback {
            if !(100..600).contains(&fallback.status) {
                problems.push(format!(
                    "services.{}.fallback.status: {} is not an HTTP status",
                    svc.name, fallback.status
                ));
            }
        }
    }

    for (i, a) in services.iter().enumerate() {
        for b in services.iter().skip(i + 1) {
            if prefixes_overlap(&a.prefix, &b.prefix) {
                problems.push(format!(
                    "services: prefixes '{}' ({}) and '{}' ({}) overlap",
                    a.prefix, a.name, b.prefix, b.name
                ));
            }
        }
    }
}

/// Two prefixes overlap when one equals the other or is a segment-aligned
/// ancestor of it.
fn prefixes_overlap(a: &str, b: &str) -> bool {
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    long == short || (long.starts_with(short) && long.as_bytes().get(short.len()) == Some(&b'/'))
}
