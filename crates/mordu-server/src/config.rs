//! Configuration management for the mordu server

use anyhow::{Context, Result};
use mordu::oracle::OracleConfig;
use mordu::SyncConfig;
use serde::Deserialize;
use std::path::PathBuf;

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server host (default: 0.0.0.0)
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port (default: 3001)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory holding the local collection files (default: ./data)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// MongoDB connection string (default: mongodb://localhost:27017)
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Database name (default: mordu)
    #[serde(default = "default_database_name")]
    pub database_name: String,

    /// Completion provider API key; predictions use a fixed notice without it
    pub typhoon_api_key: Option<String>,

    /// Allowed CORS origin. Any origin when unset.
    pub frontend_url: Option<String>,

    /// Reported by the health endpoint (default: development)
    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub oracle: OracleConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_database_url() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_database_name() -> String {
    "mordu".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("HOST").unwrap_or_else(|_| default_host());
        let port = env_parse("PORT").unwrap_or_else(default_port);
        let data_dir = std::env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_data_dir());
        let database_url = std::env::var("MONGODB_URI")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .unwrap_or_else(|_| default_database_url());
        let database_name =
            std::env::var("DATABASE_NAME").unwrap_or_else(|_| default_database_name());
        let typhoon_api_key = std::env::var("TYPHOON_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        let frontend_url = std::env::var("FRONTEND_URL").ok();
        let environment = std::env::var("APP_ENV")
            .or_else(|_| std::env::var("NODE_ENV"))
            .unwrap_or_else(|_| default_environment());

        let mut sync = SyncConfig::default();
        if let Some(secs) = env_parse("SYNC_INTERVAL_SECS") {
            sync.interval_secs = secs;
        }
        if let Some(ms) = env_parse("SYNC_INITIAL_DELAY_MS") {
            sync.initial_delay_ms = ms;
        }
        if let Some(attempts) = env_parse("SYNC_MAX_CONNECTION_ATTEMPTS") {
            sync.max_connection_attempts = attempts;
        }

        let mut oracle = OracleConfig::default();
        if let Ok(model) = std::env::var("TYPHOON_MODEL") {
            oracle.model = model;
        }
        if let Ok(url) = std::env::var("TYPHOON_API_URL") {
            oracle.api_url = url;
        }

        let config = Self {
            host,
            port,
            data_dir,
            database_url,
            database_name,
            typhoon_api_key,
            frontend_url,
            environment,
            sync,
            oracle,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.sync.interval_secs == 0 {
            anyhow::bail!("sync interval must be at least one second");
        }
        if self.sync.max_connection_attempts == 0 {
            anyhow::bail!("max connection attempts must be at least 1");
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            database_url: default_database_url(),
            database_name: default_database_name(),
            typhoon_api_key: None,
            frontend_url: None,
            environment: default_environment(),
            sync: SyncConfig::default(),
            oracle: OracleConfig::default(),
        }
    }
}
