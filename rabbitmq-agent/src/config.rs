//! Configuration loading and validation
//!
//! Handles:
//! - Management API endpoint, credentials and timeout
//! - Optional TLS client identity (key + certificate pair)
//! - Item delivery sink settings
//! - OS-specific default location

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable consulted when no path is given on the command line.
pub const CONFIG_ENV: &str = "RABBITMQ_AGENT_CONFIG";

const MAX_TIMEOUT_SECS: u64 = 600;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("api port must be between 1 and 65535, got {0}")]
    InvalidPort(u16),

    #[error("api timeout must be between 0 and 600 seconds, got {0}")]
    InvalidTimeout(u64),

    #[error("poll interval must be at least 1 second")]
    InvalidInterval,

    #[error("delivery queue capacity must be at least 1")]
    InvalidQueueCapacity,

    #[error("ssl is enabled: please specify ssl_key_file and ssl_cert_file")]
    MissingTlsIdentity,

    #[error("could not determine local hostname, set `hostname` explicitly")]
    Hostname,

    #[error("could not find config directory")]
    NoConfigDir,
}

/// Where the config file came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Command line or environment; must exist.
    Explicit(PathBuf),
    /// OS config directory; defaults apply when absent.
    OsDefault(PathBuf),
}

impl ConfigSource {
    pub fn path(&self) -> &Path {
        match self {
            ConfigSource::Explicit(path) | ConfigSource::OsDefault(path) => path,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Host tag attached to every delivered item.
    pub hostname: String,
    pub interval_secs: u64,
    pub api: ApiConfig,
    pub delivery: DeliveryConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub user: String,
    pub pass: String,
    pub host: String,
    pub port: u16,
    /// Zero disables the client-side timeout.
    pub timeout_secs: u64,
    pub ssl: bool,
    pub ssl_key_file: Option<PathBuf>,
    pub ssl_cert_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub sink: SinkKind,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_client_id: Option<String>,
    pub topic: String,
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Mqtt,
    Stdout,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            hostname: local_hostname(),
            interval_secs: 60,
            api: ApiConfig::default(),
            delivery: DeliveryConfig::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            user: "guest".to_string(),
            pass: "guest".to_string(),
            host: "localhost".to_string(),
            port: 15672,
            timeout_secs: 3,
            ssl: false,
            ssl_key_file: None,
            ssl_cert_file: None,
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            sink: SinkKind::Mqtt,
            mqtt_host: "localhost".to_string(),
            mqtt_port: 1883,
            mqtt_client_id: None,
            topic: "rabbitmq/items@v1".to_string(),
            queue_capacity: 4096,
        }
    }
}

fn local_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_default()
}

impl AgentConfig {
    /// Load config from `source`. Only the OS default location may be absent.
    pub async fn load_from(source: &ConfigSource) -> Result<Self, ConfigError> {
        match source {
            ConfigSource::OsDefault(path) if !path.exists() => Ok(Self::default()),
            ConfigSource::Explicit(path) | ConfigSource::OsDefault(path) => Self::load(path).await,
        }
    }

    /// Load config from `path`, which must exist
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Pick the config file: explicit argument, then environment, then the OS default
    pub fn resolve_path(arg: Option<String>) -> Result<ConfigSource, ConfigError> {
        if let Some(arg) = arg {
            return Ok(ConfigSource::Explicit(PathBuf::from(arg)));
        }
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            return Ok(ConfigSource::Explicit(PathBuf::from(env_path)));
        }
        Self::config_file_path().map(ConfigSource::OsDefault)
    }

    /// Get OS-specific config file path
    pub fn config_file_path() -> Result<PathBuf, ConfigError> {
        let mut path = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        path.push("rabbitmq-agent");
        path.push("config.toml");
        Ok(path)
    }

    /// Reject values the poller cannot work with. Runs once, before the first poll.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hostname.trim().is_empty() {
            return Err(ConfigError::Hostname);
        }
        if self.interval_secs == 0 {
            return Err(ConfigError::InvalidInterval);
        }
        if self.delivery.queue_capacity == 0 {
            return Err(ConfigError::InvalidQueueCapacity);
        }
        self.api.validate()
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl ApiConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }
        if self.timeout_secs > MAX_TIMEOUT_SECS {
            return Err(ConfigError::InvalidTimeout(self.timeout_secs));
        }
        if self.ssl && (self.ssl_key_file.is_none() || self.ssl_cert_file.is_none()) {
            return Err(ConfigError::MissingTlsIdentity);
        }
        Ok(())
    }

    pub fn scheme(&self) -> &'static str {
        if self.ssl {
            "https"
        } else {
            "http"
        }
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme(), self.host, self.port)
    }

    pub fn timeout(&self) -> Option<Duration> {
        match self.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
