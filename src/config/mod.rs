mod loader;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use loader::load_config;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub portal: PortalConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Relay server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8066,
            host: "127.0.0.1".to_string(),
        }
    }
}

/// OpenAI-compatible chat backend configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Base URL of the backend API (e.g., "https://api.openai.com/v1")
    #[serde(default = "default_backend_url")]
    pub url: String,
    /// Overall timeout for a chat completion call, in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Overall timeout for the model catalog call, in seconds
    #[serde(default = "default_model_list_timeout")]
    pub model_list_timeout_seconds: u64,
    /// Shared API token used only for listing models
    #[serde(default)]
    pub shared_token: Option<String>,
    /// TLS configuration options
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

/// TLS configuration for outbound connections
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Accept invalid certificates (self-signed, expired)
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// Path to custom CA certificate (PEM format)
    pub ca_cert_path: Option<String>,
}

fn default_backend_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_timeout() -> u64 {
    300
}

fn default_model_list_timeout() -> u64 {
    10
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            timeout_seconds: default_timeout(),
            model_list_timeout_seconds: default_model_list_timeout(),
            shared_token: None,
            tls: None,
        }
    }
}

impl BackendConfig {
    /// Returns the base URL with trailing slash stripped
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// Returns the shared listing token, treating an empty string as unset
    pub fn shared_token(&self) -> Option<&str> {
        self.shared_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Token broker configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrokerConfig {
    /// Full URL of the broker's ensure-token endpoint
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_token_label")]
    pub token_name: String,
    #[serde(default = "default_token_label")]
    pub token_group: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_token_url() -> String {
    "http://companion/open-webui/ensure_token".to_string()
}

fn default_token_label() -> String {
    "open-webui".to_string()
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            token_url: default_token_url(),
            token_name: default_token_label(),
            token_group: default_token_label(),
            timeout_seconds: default_timeout(),
        }
    }
}

/// User-facing labels used when explaining failures
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PortalConfig {
    /// Name of the identity provider users must register through
    #[serde(default = "default_provider_name")]
    pub provider_name: String,
    /// Name of the aggregator that owns the broker's user accounts
    #[serde(default = "default_aggregator_name")]
    pub aggregator_name: String,
    /// Portal where users log in and top up credit
    #[serde(default = "default_portal_url")]
    pub url: String,
}

fn default_provider_name() -> String {
    "LakeLink ZITADEL".to_string()
}

fn default_aggregator_name() -> String {
    "LakeLink AI Aggregator".to_string()
}

fn default_portal_url() -> String {
    "https://ai.lklk.tech".to_string()
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            provider_name: default_provider_name(),
            aggregator_name: default_aggregator_name(),
            url: default_portal_url(),
        }
    }
}

/// User store configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StoreConfig {
    /// JSON file holding user records; in-memory when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        load_config(path)
    }

    /// Load configuration with fallback to default path
    pub fn load_or_default(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        match config_path {
            Some(path) => Self::from_file(path),
            None => {
                let default_paths = ["config.yaml", "config.yml", "./config/config.yaml"];
                for p in default_paths {
                    let path = Path::new(p);
                    if path.exists() {
                        return Self::from_file(path);
                    }
                }
                Err(ConfigError::NotFound(
                    "No config file found. Tried: config.yaml, config.yml, ./config/config.yaml"
                        .to_string(),
                ))
            }
        }
    }

    /// Check URLs and timeouts
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url("backend.url", &self.backend.url)?;
        validate_url("broker.token_url", &self.broker.token_url)?;

        for (field, secs) in [
            ("backend.timeout_seconds", self.backend.timeout_seconds),
            (
                "backend.model_list_timeout_seconds",
                self.backend.model_list_timeout_seconds,
            ),
            ("broker.timeout_seconds", self.broker.timeout_seconds),
        ] {
            if secs == 0 {
                return Err(ConfigError::Validation(format!("{} must be > 0", field)));
            }
        }

        Ok(())
    }
}

fn validate_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(value)
        .map_err(|e| ConfigError::Validation(format!("{} is not a valid URL ({}): {}", field, value, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::Validation(format!(
            "{} must use http or https, got '{}'",
            field, other
        ))),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}
