//! Configuration loading and resolution
//!
//! Bootstrap configuration comes from a single TOML file. Resolution order for
//! the file location:
//! 1. Command-line argument (highest priority)
//! 2. `RARITY_CONFIG` environment variable
//! 3. OS-dependent default (`~/.config/rarity/rarity.toml` on Linux)
//!
//! A missing file is not an error: a warning is logged and compiled defaults
//! are used. A file that exists but cannot be parsed is a configuration error.
//! Individual settings may still be overridden afterwards by CLI flags and
//! their environment variables (see the `rarity-scan` binary).

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "RARITY_CONFIG";

/// Default number of concurrent fetch workers
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Upper bound on concurrent fetch workers
pub const MAX_CONCURRENCY: usize = 1024;

/// Default attempts per item before it is abandoned
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default HTTP gateway used to rewrite `ipfs://` URIs
pub const DEFAULT_IPFS_GATEWAY: &str = "https://ipfs.io/ipfs";

/// Default HTTP API listen address
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:5790";

/// Default per-request HTTP timeout
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    /// Fetch scheduling and network settings
    #[serde(default)]
    pub scan: ScanConfig,

    /// Result cache settings
    #[serde(default)]
    pub store: StoreConfig,

    /// HTTP API settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[scan]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanConfig {
    /// Number of concurrent fetch workers (>= 1)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Attempts per item before it is abandoned (>= 1)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Gateway prefix for `ipfs://` URIs
    #[serde(default = "default_ipfs_gateway")]
    pub ipfs_gateway: String,

    /// JSON-RPC endpoint used to read the collection contract
    #[serde(default)]
    pub rpc_url: Option<String>,

    /// Optional ceiling on outgoing metadata requests per second
    #[serde(default)]
    pub requests_per_second: Option<u32>,

    /// Per-request HTTP timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// `[store]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// SQLite file holding cached scan results.
    /// Falls back to the platform data directory when unset.
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Reuse a stored result instead of re-fetching.
    /// When false the store is cleared before each scan.
    #[serde(default = "default_use_cache")]
    pub use_cache: bool,
}

/// `[server]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

/// `[logging]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_ipfs_gateway() -> String {
    DEFAULT_IPFS_GATEWAY.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_use_cache() -> bool {
    true
}

fn default_bind_address() -> String {
    DEFAULT_BIND_ADDRESS.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            ipfs_gateway: default_ipfs_gateway(),
            rpc_url: None,
            requests_per_second: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            use_cache: default_use_cache(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl TomlConfig {
    /// Parse a config file. Fails if the file is missing or malformed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let config: TomlConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file, falling back to defaults when it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(
                "Config file {} not found, using built-in defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let config = Self::load(path)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Reject settings the scheduler cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.scan.concurrency == 0 || self.scan.concurrency > MAX_CONCURRENCY {
            return Err(Error::Config(format!(
                "scan.concurrency must be between 1 and {}",
                MAX_CONCURRENCY
            )));
        }
        if self.scan.max_attempts == 0 {
            return Err(Error::Config("scan.max_attempts must be at least 1".to_string()));
        }
        if self.scan.ipfs_gateway.trim().is_empty() {
            return Err(Error::Config("scan.ipfs_gateway must not be empty".to_string()));
        }
        if self.scan.requests_per_second == Some(0) {
            return Err(Error::Config(
                "scan.requests_per_second must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }
}

impl StoreConfig {
    /// Configured database path, or the platform default
    pub fn resolved_database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(default_database_path)
    }
}

/// Locates the bootstrap config file
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    cli_path: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new(cli_path: Option<PathBuf>) -> Self {
        Self { cli_path }
    }

    /// Config file path by priority: CLI → ENV → platform default
    pub fn config_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.cli_path {
            return Some(path.clone());
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        default_config_path()
    }

    /// Resolve and load the configuration.
    ///
    /// An explicitly requested file (CLI or ENV) must exist; the platform
    /// default may be absent.
    pub fn resolve(&self) -> Result<TomlConfig> {
        let explicit = self.cli_path.is_some()
            || std::env::var(CONFIG_ENV_VAR)
                .map(|v| !v.trim().is_empty())
                .unwrap_or(false);

        match self.config_path() {
            Some(path) if explicit => TomlConfig::load(&path),
            Some(path) => TomlConfig::load_or_default(&path),
            None => {
                warn!("No config directory available, using built-in defaults");
                Ok(TomlConfig::default())
            }
        }
    }
}

/// Platform config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("rarity").join("rarity.toml"))
}

/// Platform location of the result cache database
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("rarity").join("rarity.db"))
        .unwrap_or_else(|| PathBuf::from("./rarity_data/rarity.db"))
}

/// Write a config file atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
