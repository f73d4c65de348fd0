//! Configuration loading.
//!
//! Order of precedence, lowest first: built-in defaults, the config file,
//! environment variables.

use crate::config::{GatewayConfig, LogFormat};
use crate::error::{ConfigError, ConfigResult};
use crate::validation::validate_config;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Builder-style configuration loader
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env_overrides: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a loader that reads only defaults and the environment
    #[must_use]
    pub fn new() -> Self {
        Self {
            file: None,
            env_overrides: true,
        }
    }

    /// Read the given YAML or TOML file
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Enable or disable environment overrides
    #[must_use]
    pub fn with_env_overrides(mut self, enabled: bool) -> Self {
        self.env_overrides = enabled;
        self
    }

    /// Load, override and validate
    pub async fn load(&self) -> ConfigResult<GatewayConfig> {
        let mut config = match &self.file {
            Some(path) => {
                info!(path = %path.display(), "Loading configuration file");
                let content = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| ConfigError::Io {
                        path: path.clone(),
                        source,
                    })?;
                parse_config(path, &content)?
            }
            None => {
                debug!("No configuration file given, using defaults");
                GatewayConfig::default()
            }
        };

        if self.env_overrides {
            apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
        }

        validate_config(&config)?;
        Ok(config)
    }
}

/// Load configuration from an optional file path with env overrides
pub async fn load_config(path: Option<&Path>) -> ConfigResult<GatewayConfig> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = path {
        loader = loader.with_file(path);
    }
    loader.load().await
}

fn parse_config(path: &Path, content: &str) -> ConfigResult<GatewayConfig> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    let parse_err = |message: String| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    };

    match extension.as_deref() {
        Some("yaml" | "yml") => serde_yaml::from_str(content).map_err(|e| parse_err(e.to_string())),
        Some("toml") => toml::from_str(content).map_err(|e| parse_err(e.to_string())),
        _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
    }
}

/// Apply environment overrides using `lookup` to read variables.
///
/// Recognised keys: `GATEWAY_HOST`, `GATEWAY_PORT`, `REDIS_URL`,
/// `CACHE_KEY_PREFIX`, `JWT_SECRET`, `LOG_LEVEL`, `LOG_FORMAT` and one
/// `<SERVICE>_SERVICE_URL` per configured service.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F) -> ConfigResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("GATEWAY_HOST") {
        config.server.host = host;
    }
    if let Some(port) = lookup("GATEWAY_PORT") {
        config.server.port = port.parse().map_err(|e| ConfigError::InvalidEnv {
            key: "GATEWAY_PORT".to_string(),
            message: format!("{e}"),
        })?;
    }
    if let Some(url) = lookup("REDIS_URL") {
        config.cache.redis_url = Some(url).filter(|u| !u.is_empty());
    }
    if let Some(prefix) = lookup("CACHE_KEY_PREFIX") {
        config.cache.key_prefix = prefix;
    }
    if let Some(secret) = lookup("JWT_SECRET") {
        config.auth.jwt_secret = Some(secret);
    }
    if let Some(level) = lookup("LOG_LEVEL") {
        config.telemetry.log_level = level;
    }
    if let Some(format) = lookup("LOG_FORMAT") {
        config.telemetry.log_format = match format.to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" | "text" => LogFormat::Pretty,
            other => {
                return Err(ConfigError::InvalidEnv {
                    key: "LOG_FORMAT".to_string(),
                    message: format!("unknown format '{other}'"),
                })
            }
        };
    }

    for svc in &mut config.services {
        let key = svc.url_env_key();
        if let Some(url) = lookup(&key) {
            debug!(service = %svc.name, key = %key, "Overriding service URL from environment");
            svc.base_url = Some(url);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_overrides() {
        let mut config = GatewayConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[
                ("GATEWAY_PORT", "9000"),
                ("REDIS_URL", "redis://cache:6379"),
                ("USER_SERVICE_URL", "http://users:8080"),
                ("LOG_FORMAT", "json"),
            ]),
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.cache.redis_url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(
            config.service("user").unwrap().base_url.as_deref(),
            Some("http://users:8080")
        );
        assert_eq!(config.telemetry.log_format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_port_override() {
        let mut config = GatewayConfig::default();
        let err = apply_env_overrides(&mut config, env(&[("GATEWAY_PORT", "not-a-port")]));
        assert!(matches!(err, Err(ConfigError::InvalidEnv { .. })));
    }

    #[tokio::test]
    async fn test_load_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "server:\n  port: 8181\ncache:\n  key_prefix: \"edge:\"\n  ttl:\n    user: 10m"
        )
        .unwrap();

        let config = ConfigLoader::new()
            .with_file(file.path())
            .with_env_overrides(false)
            .load()
            .await
            .unwrap();

        assert_eq!(config.server.port, 8181);
        assert_eq!(config.cache.key_prefix, "edge:");
        assert_eq!(config.cache.ttl.user, std::time::Duration::from_secs(600));
        assert_eq!(config.services.len(), 3);
    }

    #[tokio::test]
    async fn test_load_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[server]\nport = 7070\n\n[[services]]\nname = \"catalog\"\nprefix = \"/api/catalog\"\nbase_url = \"http://catalog:80\"\n"
        )
        .unwrap();

        let config = ConfigLoader::new()
            .with_file(file.path())
            .with_env_overrides(false)
            .load()
            .await
            .unwrap();

        assert_eq!(config.server.port, 7070);
        assert_eq!(config.services.len(), 1);
        assert_eq!(config.services[0].name, "catalog");
    }

    #[tokio::test]
    async fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        let err = ConfigLoader::new()
            .with_file(file.path())
            .with_env_overrides(false)
            .load()
            .await;
        assert!(matches!(err, Err(ConfigError::UnsupportedFormat(_))));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = ConfigLoader::new()
            .with_file("/definitely/not/here.yaml")
            .load()
            .await;
        assert!(matches!(err, Err(ConfigError::Io { .. })));
    }
}
