//! TOML config loading.

use std::path::Path;

use crate::models::OrionConfig;
use crate::validation::validate;

/// Errors surfaced while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Load configuration from a TOML file. A missing file yields the defaults;
/// every field has a default so partial files are fine.
pub fn load_config(
    path: impl AsRef<Path>,
) -> Result<OrionConfig, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        log::info!(
            "[Config] no config at {}, using defaults",
            path.display()
        );
        return Ok(OrionConfig::default());
    }
    let raw = std::fs::read_to_string(path)?;
    load_config_str(&raw)
}

/// Parse configuration from an in-memory TOML string.
pub fn load_config_str(raw: &str) -> Result<OrionConfig, ConfigError> {
    let config: OrionConfig = toml::from_str(raw)?;
    for warning in validate(&config) {
        log::warn!("[Config] {warning}");
    }
    Ok(config)
}
