//! Configuration loading: TOML file, then environment overrides.
//!
//! | Variable | Field |
//! |----------|-------|
//! | `UPLINK_URL` | `url` |
//! | `UPLINK_APP_ID` | `app_id` |
//! | `UPLINK_SECRET_KEY` | `secret_key` |
//! | `UPLINK_ENV` | `environment` |
//! | `UPLINK_APP_ROOT` | `app_root` |

use crate::domain::{AgentConfig, ConfigError};
use std::path::{Path, PathBuf};

/// Read `path` (if given) and apply environment overrides.
///
/// Validation is left to the caller.
pub fn load_config(path: Option<&Path>) -> Result<AgentConfig, ConfigError> {
    let mut config = match path {
        Some(path) => parse_file(path)?,
        None => AgentConfig::default(),
    };
    apply_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Parse a TOML config file.
pub fn parse_file(path: &Path) -> Result<AgentConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    parse_str(&raw)
}

/// Parse TOML text.
pub fn parse_str(raw: &str) -> Result<AgentConfig, ConfigError> {
    toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))
}

/// Apply overrides from `lookup`. Empty values are ignored.
pub fn apply_overrides<F>(config: &mut AgentConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    if let Some(url) = get("UPLINK_URL") {
        config.url = url;
    }
    if let Some(app_id) = get("UPLINK_APP_ID") {
        config.app_id = app_id;
    }
    if let Some(secret_key) = get("UPLINK_SECRET_KEY") {
        config.secret_key = secret_key;
    }
    if let Some(environment) = get("UPLINK_ENV") {
        config.environment = environment;
    }
    if let Some(app_root) = get("UPLINK_APP_ROOT") {
        config.app_root = PathBuf::from(app_root);
    }
}
