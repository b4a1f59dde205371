//! Configuration resolution for the cosmowall service
//!
//! Upstream API key priority: ENV → TOML → shared placeholder key.

use cosmowall_common::config::TomlConfig;
use tracing::{info, warn};

/// Environment variable holding the upstream API key
pub const API_KEY_ENV_VAR: &str = "NASA_API_KEY";

/// Shared, heavily rate-limited key used when nothing is configured
pub const PLACEHOLDER_API_KEY: &str = "DEMO_KEY";

/// Resolve the upstream API key
pub fn resolve_api_key(toml_config: &TomlConfig) -> String {
    let env_key = std::env::var(API_KEY_ENV_VAR).ok().filter(|k| is_valid_key(k));
    let toml_key = toml_config.api_key.as_ref().filter(|k| is_valid_key(k));

    if env_key.is_some() && toml_key.is_some() {
        warn!(
            "API key found in both {} and TOML config. Using environment (highest priority).",
            API_KEY_ENV_VAR
        );
    }

    if let Some(key) = env_key {
        info!("API key loaded from environment variable");
        return key;
    }

    if let Some(key) = toml_key {
        info!("API key loaded from TOML config");
        return key.clone();
    }

    warn!(
        "No API key configured; using {} (shared, rate-limited). Set {} to raise limits.",
        PLACEHOLDER_API_KEY, API_KEY_ENV_VAR
    );
    PLACEHOLDER_API_KEY.to_string()
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
