//! Configuration management for the Kubermatic API
//!
//! Settings are resolved in this order, later sources winning:
//! 1. Default values
//! 2. Configuration file (TOML)
//! 3. Environment variables (`KUBERMATIC_*`)

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KubermaticConfig {
    pub server: ServerConfig,
    pub logging: LoggingSection,
    pub store: StoreConfig,
    pub rbac: RbacConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Logging settings as they appear in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// trace, debug, info, warn or error
    pub level: String,
    /// Emit JSON lines on the console instead of human readable output
    pub json: bool,
    /// Directory for rolling log files, none disables file logging
    pub log_dir: Option<PathBuf>,
    /// hourly, daily or never
    pub rotation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Kubernetes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// kubeconfig context, the current context when unset
    pub context: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RbacConfig {
    /// Run the RBAC controllers next to the API server
    pub enabled: bool,
    /// Namespace holding project credential secrets
    pub credentials_namespace: String,
    pub retry_steps: u32,
    pub retry_backoff_ms: u64,
    pub requeue_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret for bearer tokens
    pub jwt_secret: String,
    /// Expected `iss` claim, not checked when unset
    pub issuer: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            log_dir: None,
            rotation: "daily".to_string(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            context: None,
        }
    }
}

impl Default for RbacConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            enabled: true,
            credentials_namespace: "kubermatic".to_string(),
            retry_steps: retry.steps,
            retry_backoff_ms: retry.duration.as_millis() as u64,
            requeue_seconds: 30,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            issuer: None,
        }
    }
}

impl RbacConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            steps: self.retry_steps,
            duration: Duration::from_millis(self.retry_backoff_ms),
            ..RetryPolicy::default()
        }
    }

    pub fn requeue(&self) -> Duration {
        Duration::from_secs(self.requeue_seconds)
    }
}

impl KubermaticConfig {
    /// Load from the first config file found, then apply environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::find_config_file() {
            Some(path) => Self::load_from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_path_buf(), e.to_string()))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    fn find_config_file() -> Option<PathBuf> {
        let paths = [
            std::env::var("KUBERMATIC_CONFIG").ok().map(PathBuf::from),
            Some(PathBuf::from("/etc/kubermatic/config.toml")),
            Some(PathBuf::from("./kubermatic.toml")),
        ];

        paths.into_iter().flatten().find(|p| p.exists())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `KUBERMATIC_*` overrides looked up through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("KUBERMATIC_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("KUBERMATIC_PORT") {
            self.server.port = parse_env("KUBERMATIC_PORT", &port)?;
        }

        if let Some(level) = lookup("KUBERMATIC_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = lookup("KUBERMATIC_LOG_JSON") {
            self.logging.json = parse_env("KUBERMATIC_LOG_JSON", &json)?;
        }
        if let Some(dir) = lookup("KUBERMATIC_LOG_DIR") {
            self.logging.log_dir = Some(PathBuf::from(dir));
        }

        if let Some(backend) = lookup("KUBERMATIC_STORE") {
            self.store.backend = match backend.as_str() {
                "memory" => StoreBackend::Memory,
                "kubernetes" => StoreBackend::Kubernetes,
                other => {
                    return Err(ConfigError::Validation(format!(
                        "KUBERMATIC_STORE must be memory or kubernetes, got {:?}",
                        other
                    )))
                }
            };
        }
        if let Some(context) = lookup("KUBERMATIC_KUBE_CONTEXT") {
            self.store.context = Some(context);
        }

        if let Some(enabled) = lookup("KUBERMATIC_RBAC_ENABLED") {
            self.rbac.enabled = parse_env("KUBERMATIC_RBAC_ENABLED", &enabled)?;
        }
        if let Some(ns) = lookup("KUBERMATIC_CREDENTIALS_NAMESPACE") {
            self.rbac.credentials_namespace = ns;
        }

        if let Some(secret) = lookup("KUBERMATIC_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Some(issuer) = lookup("KUBERMATIC_JWT_ISSUER") {
            self.auth.issuer = Some(issuer);
        }
        Ok(())
    }

    pub fn generate_sample() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("Port cannot be 0".to_string()));
        }
        if self.auth.jwt_secret.len() < 32 {
            return Err(ConfigError::Validation(
                "auth.jwt_secret must be at least 32 bytes".to_string(),
            ));
        }
        if self.rbac.retry_steps == 0 {
            return Err(ConfigError::Validation(
                "rbac.retry_steps must be at least 1".to_string(),
            ));
        }
        if self.rbac.credentials_namespace.is_empty() {
            return Err(ConfigError::Validation(
                "rbac.credentials_namespace cannot be empty".to_string(),
            ));
        }
        if !matches!(self.logging.rotation.as_str(), "hourly" | "daily" | "never") {
            return Err(ConfigError::Validation(format!(
                "logging.rotation must be hourly, daily or never, got {:?}",
                self.logging.rotation
            )));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::Validation(format!("invalid value {:?} for {}", value, key)))
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0:?}: {1}")]
    FileRead(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Config validation failed: {0}")]
    Validation(String),
}
