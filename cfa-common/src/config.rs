//! Configuration loading and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. `CFA_ROOT_FOLDER` environment variable
//! 3. `root_folder` in the TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing TOML file is not an error: defaults are used and a warning is
//! logged. A TOML file that exists but cannot be parsed is a configuration
//! error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "CFA_ROOT_FOLDER";
/// Environment variable overriding the config file location
pub const CONFIG_FILE_ENV: &str = "CFA_CONFIG";
/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "cfa.db";

/// Top-level TOML configuration (`cfa.toml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub engine: EngineConfig,
    pub server: ServerConfig,
    pub sources: SourcesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing level when RUST_LOG is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Ingestion and consensus tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Seconds between scheduled ingestion cycles
    pub ingest_interval_secs: u64,
    /// Per-adapter-call timeout in seconds
    pub adapter_timeout_secs: u64,
    /// Cycle watchdog: no new events are started after this many seconds
    pub cycle_ceiling_secs: u64,
    /// Number of events processed concurrently within one cycle
    pub event_concurrency: usize,
    /// Confidence level of the bootstrap interval
    pub confidence_level: f64,
    /// Number of bootstrap resamples
    pub bootstrap_resamples: usize,
    /// Fixed RNG seed for reproducible intervals (None = OS entropy)
    pub bootstrap_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ingest_interval_secs: 900,
            adapter_timeout_secs: 20,
            cycle_ceiling_secs: 600,
            event_concurrency: 4,
            confidence_level: 0.90,
            bootstrap_resamples: 1000,
            bootstrap_seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5740".to_string(),
        }
    }
}

/// External source endpoints and credentials
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourcesConfig {
    pub polymarket_base_url: String,
    pub kalshi_base_url: String,
    pub metaculus_base_url: String,
    pub public_model_base_url: String,
    pub kalshi_api_key: Option<String>,
    pub kalshi_api_secret: Option<String>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            polymarket_base_url: "https://clob.polymarket.com".to_string(),
            kalshi_base_url: "https://trading-api.kalshi.com/trade-api/v2".to_string(),
            metaculus_base_url: "https://www.metaculus.com/api".to_string(),
            public_model_base_url: "https://www.economist.com/interactive".to_string(),
            kalshi_api_key: None,
            kalshi_api_secret: None,
        }
    }
}

impl TomlConfig {
    /// Validate value ranges
    pub fn validate(&self) -> Result<()> {
        let engine = &self.engine;

        if !(engine.confidence_level > 0.0 && engine.confidence_level < 1.0) {
            return Err(Error::Config(format!(
                "engine.confidence_level must be in (0, 1), got {}",
                engine.confidence_level
            )));
        }
        if engine.bootstrap_resamples == 0 {
            return Err(Error::Config("engine.bootstrap_resamples must be >= 1".to_string()));
        }
        if engine.adapter_timeout_secs == 0 {
            return Err(Error::Config("engine.adapter_timeout_secs must be > 0".to_string()));
        }
        if engine.ingest_interval_secs == 0 {
            return Err(Error::Config("engine.ingest_interval_secs must be > 0".to_string()));
        }
        if engine.cycle_ceiling_secs == 0 {
            return Err(Error::Config("engine.cycle_ceiling_secs must be > 0".to_string()));
        }
        if engine.event_concurrency == 0 {
            return Err(Error::Config("engine.event_concurrency must be >= 1".to_string()));
        }

        Ok(())
    }
}

/// Load and validate a TOML config file
///
/// Returns defaults (with a warning) if the file does not exist.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!("Config file not found at {} - using defaults", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
    config.validate()?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Locate the config file: CLI argument → `CFA_CONFIG` → `<config dir>/cfa/cfa.toml`
pub fn resolve_config_path(cli_arg: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
        return PathBuf::from(path);
    }

    dirs::config_dir()
        .map(|d| d.join("cfa").join("cfa.toml"))
        .unwrap_or_else(|| PathBuf::from("cfa.toml"))
}

/// Root folder resolver following the 4-tier priority order
pub struct RootFolderResolver<'a> {
    cli_arg: Option<PathBuf>,
    toml_config: &'a TomlConfig,
}

impl<'a> RootFolderResolver<'a> {
    pub fn new(cli_arg: Option<PathBuf>, toml_config: &'a TomlConfig) -> Self {
        Self {
            cli_arg,
            toml_config,
        }
    }

    pub fn resolve(&self) -> PathBuf {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        // Priority 3: TOML config file
        if let Some(path) = &self.toml_config.root_folder {
            return path.clone();
        }

        // Priority 4: OS-dependent compiled default
        default_root_folder()
    }
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("cfa"))
        .unwrap_or_else(|| PathBuf::from("./cfa_data"))
}

/// Creates the root folder and derives paths inside it
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            info!("Created root folder: {}", self.root_folder.display());
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE)
    }
}

/// Kalshi credentials resolved from ENV → TOML
#[derive(Debug, Clone, PartialEq)]
pub struct KalshiCredentials {
    pub api_key: String,
    pub api_secret: String,
}

/// Resolve Kalshi credentials
///
/// **Priority:** ENV (`KALSHI_API_KEY` / `KALSHI_API_SECRET`) → TOML.
/// Both halves must come from the same tier.
pub fn resolve_kalshi_credentials(sources: &SourcesConfig) -> Option<KalshiCredentials> {
    let env_key = std::env::var("KALSHI_API_KEY").ok();
    let env_secret = std::env::var("KALSHI_API_SECRET").ok();

    if let (Some(api_key), Some(api_secret)) = (env_key, env_secret) {
        if is_valid_key(&api_key) && is_valid_key(&api_secret) {
            info!("Kalshi credentials loaded from environment");
            return Some(KalshiCredentials { api_key, api_secret });
        }
    }

    match (&sources.kalshi_api_key, &sources.kalshi_api_secret) {
        (Some(api_key), Some(api_secret)) if is_valid_key(api_key) && is_valid_key(api_secret) => {
            info!("Kalshi credentials loaded from TOML config");
            Some(KalshiCredentials {
                api_key: api_key.clone(),
                api_secret: api_secret.clone(),
            })
        }
        _ => {
            warn!("Kalshi credentials not configured - Kalshi source will be skipped");
            None
        }
    }
}

/// Validate a credential (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
