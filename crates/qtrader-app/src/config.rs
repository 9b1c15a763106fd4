//! Application configuration.
//!
//! Loaded from TOML. Every field has a default, so an empty file (or no file
//! at the default path) is a valid configuration.

use crate::error::{AppError, AppResult};
use qtrader_dashboard::DashboardConfig;
use qtrader_feed::SyntheticConfig;
use qtrader_telemetry::StatsConfig;
use qtrader_ws::{resolve_endpoint, ConnectionConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Env var naming the config file.
pub const CONFIG_ENV: &str = "QTRADER_CONFIG";
/// Env var overriding the backend base URL.
pub const BACKEND_URL_ENV: &str = "QTRADER_BACKEND_URL";
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// `[transport]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSection {
    /// Origin the endpoint is derived from when no backend URL is set.
    #[serde(default = "default_page_origin")]
    pub page_origin: String,
    /// Backend base URL, or `local` for the development endpoint.
    #[serde(default)]
    pub backend_url: Option<String>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// 0 keeps synthetic fallback terminal.
    #[serde(default)]
    pub failback_probe_interval_ms: u64,
}

fn default_page_origin() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    3000
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            page_origin: default_page_origin(),
            backend_url: None,
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            failback_probe_interval_ms: 0,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Fixes every random draw (synthetic stream and latency jitter).
    #[serde(default)]
    pub rng_seed: Option<u64>,
    #[serde(default)]
    pub transport: TransportSection,
    #[serde(default)]
    pub synthetic: SyntheticConfig,
    #[serde(default)]
    pub stats: StatsConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

impl AppConfig {
    /// Load using the path precedence `cli_path` > `QTRADER_CONFIG` > default path.
    ///
    /// A missing file at the default path yields defaults; a missing explicit
    /// path is an error.
    pub fn load(cli_path: Option<String>) -> AppResult<Self> {
        let (path, explicit) = resolve_config_path(cli_path, std::env::var(CONFIG_ENV).ok());

        if explicit || Path::new(&path).exists() {
            tracing::info!(config_path = %path, "Loading configuration");
            Self::from_file(&path)
        } else {
            tracing::warn!(path = %path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config {path}: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content).map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Apply the backend URL precedence `cli` > `QTRADER_BACKEND_URL` > file.
    pub fn apply_backend_override(&mut self, cli: Option<String>) {
        let env = std::env::var(BACKEND_URL_ENV).ok();
        self.transport.backend_url =
            resolve_backend_url(cli, env, self.transport.backend_url.take());
    }

    pub fn validate(&self) -> AppResult<()> {
        self.synthetic.validate()?;
        if self.transport.max_attempts == 0 {
            return Err(AppError::Config(
                "transport.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.transport.connect_timeout_ms == 0 {
            return Err(AppError::Config(
                "transport.connect_timeout_ms must be positive".to_string(),
            ));
        }
        if self.stats.latency_base_ms < 0.0 || self.stats.latency_jitter_ms < 0.0 {
            return Err(AppError::Config(
                "stats latency base and jitter must be non-negative".to_string(),
            ));
        }
        self.endpoint()?;
        Ok(())
    }

    /// WebSocket URL of the live source.
    pub fn endpoint(&self) -> AppResult<String> {
        Ok(resolve_endpoint(
            &self.transport.page_origin,
            self.transport.backend_url.as_deref(),
        )?)
    }

    pub fn connection_config(&self) -> AppResult<ConnectionConfig> {
        Ok(ConnectionConfig {
            url: self.endpoint()?,
            max_attempts: self.transport.max_attempts,
            retry_delay_ms: self.transport.retry_delay_ms,
            connect_timeout_ms: self.transport.connect_timeout_ms,
            failback_probe_interval_ms: self.transport.failback_probe_interval_ms,
        })
    }
}

/// Returns the path and whether it was given explicitly.
pub fn resolve_config_path(cli: Option<String>, env: Option<String>) -> (String, bool) {
    match cli.or(env).filter(|p| !p.trim().is_empty()) {
        Some(path) => (path, true),
        None => (DEFAULT_CONFIG_PATH.to_string(), false),
    }
}

/// First non-blank value of `cli`, `env`, `file`.
pub fn resolve_backend_url(
    cli: Option<String>,
    env: Option<String>,
    file: Option<String>,
) -> Option<String> {
    [cli, env, file]
        .into_iter()
        .flatten()
        .find(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.transport.max_attempts, 3);
        assert_eq!(config.transport.retry_delay_ms, 3000);
        assert_eq!(config.transport.failback_probe_interval_ms, 0);
        assert!(!config.dashboard.enabled);
        assert!(config.rng_seed.is_none());
        assert_eq!(config.endpoint().unwrap(), "ws://127.0.0.1:8080/ws");
    }

    #[test]
    fn test_empty_file_is_valid() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.synthetic.price_interval_ms, 1000);
        assert_eq!(config.stats.tick_rate_window, 60);
        tokio_test::assert_ok!(config.validate());
    }

    #[test]
    fn test_partial_sections() {
        let config = AppConfig::from_toml(
            r#"
            rng_seed = 42

            [transport]
            backend_url = "https://api.example.com"
            retry_delay_ms = 50

            [synthetic]
            max_step = 10.0
            "#,
        )
        .unwrap();
        assert_eq!(config.rng_seed, Some(42));
        assert_eq!(config.transport.retry_delay_ms, 50);
        assert_eq!(config.transport.max_attempts, 3);
        assert_eq!(config.synthetic.max_step, 10.0);
        assert_eq!(config.endpoint().unwrap(), "wss://api.example.com/ws");

        let conn = config.connection_config().unwrap();
        assert_eq!(conn.retry_delay_ms, 50);
    }

    #[test]
    fn test_invalid_origin_rejected() {
        let mut config = AppConfig::default();
        config.transport.page_origin = "ftp://files.example".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_attempts_or_timeout_rejected() {
        let mut config = AppConfig::default();
        config.transport.max_attempts = 0;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        let mut config = AppConfig::default();
        config.transport.connect_timeout_ms = 0;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        let config = AppConfig::from_toml("[transport]\nmax_attempts = 1\n").unwrap();
        tokio_test::assert_ok!(config.validate());
    }

    #[test]
    fn test_config_path_precedence() {
        assert_eq!(
            resolve_config_path(Some("a.toml".into()), Some("b.toml".into())),
            ("a.toml".to_string(), true)
        );
        assert_eq!(
            resolve_config_path(None, Some("b.toml".into())),
            ("b.toml".to_string(), true)
        );
        assert_eq!(
            resolve_config_path(None, None),
            (DEFAULT_CONFIG_PATH.to_string(), false)
        );
    }

    #[test]
    fn test_backend_url_precedence() {
        let pick = |cli: Option<&str>, env: Option<&str>, file: Option<&str>| {
            resolve_backend_url(
                cli.map(String::from),
                env.map(String::from),
                file.map(String::from),
            )
        };
        assert_eq!(pick(Some("local"), Some("https://e"), Some("https://f")).as_deref(), Some("local"));
        assert_eq!(pick(None, Some("https://e"), Some("https://f")).as_deref(), Some("https://e"));
        assert_eq!(pick(Some(" "), None, Some("https://f")).as_deref(), Some("https://f"));
        assert_eq!(pick(None, None, None), None);
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("[transport]"));
        assert!(toml_str.contains("page_origin"));
    }
}
