use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::Deserialize;
use anyhow::{Context, Result};
use shared::protocol::{DEFAULT_BATCH_SIZE, LONG_TTL_SECS, MEDIUM_TTL_SECS, SHORT_TTL_SECS};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub walker: WalkerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    /// Tokens keyed by `scheme://host[:port]`
    #[serde(default)]
    pub tokens: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_catalog_timeout")]
    pub catalog_timeout_secs: u64,
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_backend")]
    pub backend: CacheBackend,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_short_ttl")]
    pub short_ttl_secs: u64,
    #[serde(default = "default_medium_ttl")]
    pub medium_ttl_secs: u64,
    #[serde(default = "default_long_ttl")]
    pub long_ttl_secs: u64,
    #[serde(default = "default_maintenance_interval")]
    pub maintenance_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalkerConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_catalog_timeout() -> u64 {
    10
}

fn default_query_timeout() -> u64 {
    30
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_user_agent() -> String {
    concat!("catalog-explorerd/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_backend() -> CacheBackend {
    CacheBackend::Memory
}

fn default_db_path() -> PathBuf {
    PathBuf::from("/var/lib/catalog-explorer/cache.db")
}

fn default_short_ttl() -> u64 {
    SHORT_TTL_SECS
}

fn default_medium_ttl() -> u64 {
    MEDIUM_TTL_SECS
}

fn default_long_ttl() -> u64 {
    LONG_TTL_SECS
}

fn default_maintenance_interval() -> u64 {
    60
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_listen() -> String {
    "127.0.0.1:8060".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            catalog_timeout_secs: default_catalog_timeout(),
            query_timeout_secs: default_query_timeout(),
            probe_timeout_secs: default_probe_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            db_path: default_db_path(),
            short_ttl_secs: default_short_ttl(),
            medium_ttl_secs: default_medium_ttl(),
            long_ttl_secs: default_long_ttl(),
            maintenance_interval_secs: default_maintenance_interval(),
        }
    }
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

/// Time-to-live classes used when writing through the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlClasses {
    /// Query results
    pub short: Duration,
    /// Catalog listings
    pub medium: Duration,
    /// Service and layer descriptors
    pub long: Duration,
}

impl Default for TtlClasses {
    fn default() -> Self {
        CacheConfig::default().ttl_classes()
    }
}

impl CacheConfig {
    pub fn ttl_classes(&self) -> TtlClasses {
        TtlClasses {
            short: Duration::from_secs(self.short_ttl_secs),
            medium: Duration::from_secs(self.medium_ttl_secs),
            long: Duration::from_secs(self.long_ttl_secs),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }
}
