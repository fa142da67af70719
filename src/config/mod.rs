//! config
//!
//! Configuration loading and validation.
//!
//! # Discovery
//!
//! In order of precedence:
//! 1. `$PACTWORK_CONFIG` if set
//! 2. `./pactwork.toml`
//! 3. `~/.pactwork/config.toml`
//!
//! Missing files yield the defaults (which fail validation until a tenant
//! is configured); malformed files are hard errors.

use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod schema;

pub use schema::{DownstreamConfig, EngineConfig, TenantConfig};

/// Errors from configuration handling.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("no configuration found; create pactwork.toml or set PACTWORK_CONFIG")]
    NotFound,
}

/// Candidate config paths in precedence order.
fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Ok(env_path) = std::env::var("PACTWORK_CONFIG") {
        paths.push(PathBuf::from(env_path));
    }
    paths.push(PathBuf::from("pactwork.toml"));
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".pactwork").join("config.toml"));
    }
    paths
}

/// Load configuration from the discovery chain.
///
/// # Errors
///
/// [`ConfigError::NotFound`] when no candidate file exists, parse and
/// validation errors otherwise.
pub fn load() -> Result<EngineConfig, ConfigError> {
    for path in candidate_paths() {
        if path.exists() {
            return load_from_path(&path);
        }
    }
    Err(ConfigError::NotFound)
}

/// Load and validate configuration from an explicit path.
pub fn load_from_path(path: &Path) -> Result<EngineConfig, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let config: EngineConfig =
        toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
    config.validate()?;
    Ok(config)
}
