//! Configuration structures and parsing for caddystate

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Environment variable overriding `admin.url`
pub const ADMIN_URL_ENV: &str = "CADDY_ADMIN_URL";

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Global settings
    #[serde(default)]
    pub global: GlobalConfig,

    /// Admin API connection settings
    #[serde(default)]
    pub admin: AdminConfig,

    /// Upstream probe settings
    #[serde(default)]
    pub probe: ProbeConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file, falling back to defaults when the
    /// file does not exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = ?path, "Config file not found, using defaults");
            let config = Config::default();
            config.validate()?;
            return Ok(config);
        }
        Self::load(path)
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(ADMIN_URL_ENV) {
            self.apply_admin_url_override(Some(url));
        }
    }

    /// Replace the admin URL when an override is present and non-blank
    pub fn apply_admin_url_override(&mut self, url: Option<String>) {
        if let Some(url) = url {
            let url = url.trim();
            if !url.is_empty() {
                debug!(url = %url, "Overriding admin URL");
                self.admin.url = url.to_string();
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.admin.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Validation(format!(
                "Admin URL must start with http:// or https://: {}",
                self.admin.url
            )));
        }

        if self.admin.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "admin.timeout_ms must be greater than zero".to_string(),
            ));
        }

        if self.probe.tcp_timeout_ms == 0 || self.probe.http_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "probe timeouts must be greater than zero".to_string(),
            ));
        }

        let ratio = self.global.tracing.sampling_ratio;
        if !(0.0..=1.0).contains(&ratio) {
            return Err(ConfigError::Validation(format!(
                "global.tracing.sampling_ratio must be within [0, 1]: {}",
                ratio
            )));
        }

        Ok(())
    }
}

/// Global configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// OpenTelemetry tracing configuration
    #[serde(default)]
    pub tracing: TracingConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            tracing: TracingConfig::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// OpenTelemetry tracing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracingConfig {
    /// Enable OpenTelemetry tracing
    #[serde(default)]
    pub enabled: bool,

    /// OTLP endpoint (e.g., "http://localhost:4317")
    #[serde(default = "default_otlp_endpoint")]
    pub otlp_endpoint: String,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Sampling ratio (0.0 to 1.0, default: 1.0 = sample everything)
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            otlp_endpoint: default_otlp_endpoint(),
            service_name: default_service_name(),
            sampling_ratio: default_sampling_ratio(),
        }
    }
}

fn default_otlp_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "caddystate".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

/// Admin API connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Base URL of the Caddy admin endpoint
    #[serde(default = "default_admin_url")]
    pub url: String,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_admin_timeout")]
    pub timeout_ms: u64,
}

impl AdminConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            url: default_admin_url(),
            timeout_ms: default_admin_timeout(),
        }
    }
}

fn default_admin_url() -> String {
    "http://127.0.0.1:1071".to_string()
}

fn default_admin_timeout() -> u64 {
    10_000
}

/// Upstream reachability probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Raw TCP connect timeout in milliseconds
    #[serde(default = "default_tcp_timeout")]
    pub tcp_timeout_ms: u64,

    /// HTTP check timeout in milliseconds
    #[serde(default = "default_http_timeout")]
    pub http_timeout_ms: u64,
}

impl ProbeConfig {
    pub fn tcp_timeout(&self) -> Duration {
        Duration::from_millis(self.tcp_timeout_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            tcp_timeout_ms: default_tcp_timeout(),
            http_timeout_ms: default_http_timeout(),
        }
    }
}

fn default_tcp_timeout() -> u64 {
    3000
}

fn default_http_timeout() -> u64 {
    5000
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.admin.url, "http://127.0.0.1:1071");
        assert_eq!(config.admin.timeout(), Duration::from_secs(10));
        assert_eq!(config.probe.tcp_timeout(), Duration::from_millis(3000));
        assert_eq!(config.global.log_level, "info");
        assert!(!config.global.tracing.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[global]
log_level = "debug"

[global.tracing]
enabled = true
service_name = "dash"
sampling_ratio = 0.5

[admin]
url = "http://caddy:2019"
timeout_ms = 2500

[probe]
tcp_timeout_ms = 1000
"#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.global.log_level, "debug");
        assert!(config.global.tracing.enabled);
        assert_eq!(config.global.tracing.service_name, "dash");
        assert_eq!(config.global.tracing.otlp_endpoint, "http://localhost:4317");
        assert_eq!(config.admin.url, "http://caddy:2019");
        assert_eq!(config.admin.timeout_ms, 2500);
        assert_eq!(config.probe.tcp_timeout_ms, 1000);
        assert_eq!(config.probe.http_timeout_ms, 5000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.admin.url, "http://127.0.0.1:1071");
        assert_eq!(config.probe.http_timeout_ms, 5000);
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let mut config = Config::default();
        config.admin.url = "127.0.0.1:2019".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("127.0.0.1:2019"));
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        let mut config = Config::default();
        config.admin.timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.probe.tcp_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_sampling_ratio() {
        let mut config = Config::default();
        config.global.tracing.sampling_ratio = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_admin_url_override() {
        let mut config = Config::default();
        config.apply_admin_url_override(Some("  http://10.0.0.2:2019 ".to_string()));
        assert_eq!(config.admin.url, "http://10.0.0.2:2019");

        config.apply_admin_url_override(Some("   ".to_string()));
        assert_eq!(config.admin.url, "http://10.0.0.2:2019");

        config.apply_admin_url_override(None);
        assert_eq!(config.admin.url, "http://10.0.0.2:2019");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[admin]\nurl = \"https://admin.internal:2019\"").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.admin.url, "https://admin.internal:2019");
    }

    #[test]
    fn test_load_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[admin\nurl = ").unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(_)));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.admin.url, "http://127.0.0.1:1071");
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
