//! Configuration loading and config file resolution
//!
//! Every field has a compiled default, so a missing config file never stops
//! startup. Resolution order for the config file path:
//! 1. Command-line argument (highest priority)
//! 2. `COSMOWALL_CONFIG` environment variable
//! 3. `<user config dir>/cosmowall/config.toml`
//! 4. No file: compiled defaults

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "COSMOWALL_CONFIG";

/// Top-level TOML configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Upstream imagery API key (environment variable takes priority)
    pub api_key: Option<String>,
    pub bind_address: String,
    pub port: u16,
    /// Prefix of downloaded artifact file names
    pub product_name: String,
    pub logging: LoggingConfig,
    pub pool: PoolConfig,
    pub generation: GenerationConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            bind_address: "127.0.0.1".to_string(),
            port: 5780,
            product_name: "cosmowall".to_string(),
            logging: LoggingConfig::default(),
            pool: PoolConfig::default(),
            generation: GenerationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Candidate pool acquisition and caching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub cache_ttl_minutes: u64,
    pub sweep_interval_minutes: u64,
    /// Below this many aggregated URLs the fallback pool is merged in
    pub floor: usize,
    pub max_size: usize,
    /// Days walked backward through the daily-picture feed
    pub daily_picture_count: u32,
    /// Sol queried on every rover feed
    pub rover_depth: u32,
    pub inter_call_delay_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            cache_ttl_minutes: 120,
            sweep_interval_minutes: 30,
            floor: 15,
            max_size: 20,
            daily_picture_count: 10,
            rover_depth: 1000,
            inter_call_delay_ms: 100,
            request_timeout_secs: 30,
        }
    }
}

/// How the accent rectangle is randomized between preview and export
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RectanglePolicy {
    /// One draw per slot, applied proportionally to both canvases
    #[default]
    Shared,
    /// A fresh draw for every render call
    Independent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub slots: usize,
    pub rectangle_policy: RectanglePolicy,
    /// Always-available substitute when a sampled image fails to load
    pub fallback_image_url: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            slots: 3,
            rectangle_policy: RectanglePolicy::Shared,
            fallback_image_url:
                "https://apod.nasa.gov/apod/image/2301/Comet_Hattenbach_1080.jpg".to_string(),
        }
    }
}

/// Resolve which config file to read, if any
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Per-user config file, only if present
    default_config_path().filter(|p| p.exists())
}

/// `<user config dir>/cosmowall/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cosmowall").join("config.toml"))
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load the resolved config file, falling back to defaults when it is missing.
///
/// A file that exists but does not parse is an error.
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    let Some(path) = resolve_config_path(cli_arg) else {
        info!("No config file found, using compiled defaults");
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        warn!(path = %path.display(), "Config file not found, using compiled defaults");
        return Ok(TomlConfig::default());
    }

    let config = load_toml_config(&path)?;
    info!(path = %path.display(), "Loaded configuration");
    Ok(config)
}

/// Write a config file atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize config failed: {}", e)))?;

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
