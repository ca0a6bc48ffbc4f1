/// Configuration management using figment
///
/// Loads configuration with this precedence (highest wins):
/// 1. Defaults (hardcoded)
/// 2. TOML file: pgbm25.toml (in working directory)
/// 3. Environment variables: prefixed PGBM25_ (e.g., PGBM25_LOG_LEVEL=debug,
///    PGBM25_CAPABILITY__EXTENSION=pg_textsearch)

use figment::{
    Figment,
    providers::{Env, Format, Toml, Serialized},
};
use serde::{Deserialize, Serialize};
use crate::capability::Requirements;
use crate::errors::Bm25Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional file path for JSON log output (in addition to stderr)
    #[serde(default)]
    pub log_file: Option<String>,

    /// PostgreSQL connection URL.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Upper bound on pooled connections opened by the CLI.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Seconds to wait for a pooled connection before giving up.
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,

    #[serde(default)]
    pub capability: CapabilityConfig,
}

/// Server capabilities required before any scoring SQL is emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityConfig {
    /// Extension providing bm25_score() and the bm25 access method
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Index access method name as registered in pg_am
    #[serde(default = "default_access_method")]
    pub access_method: String,

    /// Minimum server_version_num (major*10000 + minor*100 + patch)
    #[serde(default = "default_min_server_version")]
    pub min_server_version: i32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_database_url() -> String {
    "postgres://localhost/postgres".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout_secs() -> u64 {
    10
}

fn default_extension() -> String {
    "pg_textsearch".to_string()
}

fn default_access_method() -> String {
    "bm25".to_string()
}

fn default_min_server_version() -> i32 {
    170000
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        CapabilityConfig {
            extension: default_extension(),
            access_method: default_access_method(),
            min_server_version: default_min_server_version(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: default_log_level(),
            log_file: None,
            database_url: default_database_url(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
            capability: CapabilityConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from defaults, TOML file, and environment variables
    ///
    /// Environment variables override TOML file values.
    /// Example: PGBM25_LOG_LEVEL=debug overrides log_level in pgbm25.toml
    pub fn load() -> Result<Config, Bm25Error> {
        Self::figment()
            .extract()
            .map_err(|e| Bm25Error::Config(format!("Failed to load config: {}", e)))
    }

    fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file("pgbm25.toml"))
            .merge(Env::prefixed("PGBM25_").split("__"))
    }

    /// Capability requirements derived from the `capability` section.
    pub fn requirements(&self) -> Requirements {
        Requirements {
            extension: self.capability.extension.clone(),
            access_method: self.capability.access_method.clone(),
            min_server_version: self.capability.min_server_version,
        }
    }
}
