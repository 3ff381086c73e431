//! Application configuration loaded from TOML.

use crate::error::{ApiError, ApiResult};
use docstore_client::ClusterConfigMap;
use serde::Deserialize;
use std::path::Path;

/// Top-level configuration of the read API.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP listener settings.
    pub server: ServerConfig,
    /// Logging settings.
    pub log: LogConfig,
    /// Which cluster and indices hold the entities.
    pub store: StoreConfig,
    /// Cluster connection settings by name.
    pub clusters: ClusterConfigMap,
}

impl AppConfig {
    /// Reads and parses a configuration file.
    pub fn load(path: &Path) -> ApiResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ApiError::Config(format!("reading {}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml_str(text: &str) -> ApiResult<Self> {
        toml::from_str(text).map_err(|e| ApiError::Config(e.to_string()))
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
}

impl ServerConfig {
    /// Returns `host:port`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// One of `DEBUG`, `INFO`, `WARN`, `ERROR`; anything else means `INFO`.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "INFO".into(),
        }
    }
}

/// Location of the advert and category documents.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreConfig {
    /// Cluster name, looked up in [`AppConfig::clusters`].
    pub cluster: String,
    /// Index holding adverts.
    pub advert_index: String,
    /// Index holding categories.
    pub category_index: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cluster: "local".into(),
            advert_index: "adverts".into(),
            category_index: "categories".into(),
        }
    }
}
