//! Configuration for the Transport NSW exporter.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use transport_nsw_common::LoggingConfig;

/// Configuration errors.
///
/// Every variant is fatal at startup: nothing is served until the
/// configuration and credential are valid.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] transport_nsw_common::Error),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("{0} env var must be set")]
    MissingCredential(String),
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// HTTP endpoint settings.
    #[serde(default)]
    pub web: WebConfig,

    /// Upstream API settings.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Per-collector settings.
    #[serde(default)]
    pub collectors: CollectorsConfig,

    /// Metric naming settings.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path for metrics endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
        }
    }
}

/// Upstream API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// API base URL, without a trailing endpoint.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Name of the environment variable holding the API token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

fn default_base_url() -> String {
    "https://api.transport.nsw.gov.au/v1".to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_token_env() -> String {
    "TRANSPORT_NSW_API_TOKEN".to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            token_env: default_token_env(),
        }
    }
}

impl UpstreamConfig {
    /// Request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Collector configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectorsConfig {
    /// Car park collector settings.
    #[serde(default)]
    pub carpark: CarparkConfig,
}

/// Car park collector configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CarparkConfig {
    /// Facility identifiers to scrape, in scrape order.
    #[serde(default)]
    pub facility_ids: Vec<String>,
}

/// Metric naming configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Metric namespace (default: "transport").
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_namespace() -> String {
    "transport".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
        }
    }
}

/// API token sourced from the process environment.
#[derive(Clone)]
pub struct ApiToken(String);

impl ApiToken {
    /// Wrap an already-known token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Read the token from the named environment variable.
    pub fn from_env(var: &str) -> Result<Self, ConfigError> {
        match std::env::var(var) {
            Ok(token) if !token.trim().is_empty() => Ok(Self(token)),
            _ => Err(ConfigError::MissingCredential(var.to_string())),
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiToken(***)")
    }
}

impl ExporterConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: ExporterConfig = transport_nsw_common::load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = transport_nsw_common::parse_config(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ids = &self.collectors.carpark.facility_ids;
        if ids.is_empty() {
            return Err(ConfigError::Validation(
                "no car park facility IDs provided in config".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(ids.len());
        for id in ids {
            if id.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "facility IDs must not be empty".to_string(),
                ));
            }
            if !seen.insert(id.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate facility ID: {}",
                    id
                )));
            }
        }

        if self.web.listen.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.web.listen
            )));
        }

        if !self.web.path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        if self.web.path == "/healthz" || self.web.path == "/readyz" {
            return Err(ConfigError::Validation(format!(
                "Metrics path {} collides with a probe endpoint",
                self.web.path
            )));
        }

        if self.upstream.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "timeout_secs must be > 0".to_string(),
            ));
        }

        match reqwest::Url::parse(&self.upstream.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => {
                return Err(ConfigError::Validation(format!(
                    "Invalid upstream base_url: {}",
                    self.upstream.base_url
                )));
            }
        }

        if !is_valid_namespace(&self.metrics.namespace) {
            return Err(ConfigError::Validation(format!(
                "Invalid metric namespace: {:?}",
                self.metrics.namespace
            )));
        }

        Ok(())
    }

    /// Resolve the API token named by `upstream.token_env`.
    pub fn api_token(&self) -> Result<ApiToken, ConfigError> {
        ApiToken::from_env(&self.upstream.token_env)
    }
}

/// Metric namespaces must match `[a-zA-Z_][a-zA-Z0-9_]*`.
fn is_valid_namespace(namespace: &str) -> bool {
    let mut chars = namespace.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
