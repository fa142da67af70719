//! config::schema
//!
//! Configuration schema types.
//!
//! # Example
//!
//! ```toml
//! data_dir = "/var/lib/pactwork"
//!
//! [tenant]
//! country_short_code = "LEB"
//! business_area_code = "0060"
//! local_currency = "USD"
//!
//! [downstream]
//! url = "https://reporting.example.org/api/documents"
//! enabled = true
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::types::TenantCode;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Store root; defaults to `./pactwork-data`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Operating tenant.
    pub tenant: TenantConfig,

    /// Downstream reporting endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downstream: Option<DownstreamConfig>,
}

impl EngineConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tenant.validate()?;
        if let Some(downstream) = &self.downstream {
            downstream.validate()?;
        }
        Ok(())
    }

    /// The effective store root.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("pactwork-data"))
    }
}

/// Tenant identity and defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TenantConfig {
    /// Country short code prefixing reference numbers (e.g. "LEB").
    pub country_short_code: String,

    /// Business area code sent on downstream documents.
    pub business_area_code: String,

    /// Default document currency.
    pub local_currency: String,
}

impl TenantConfig {
    /// Validate the tenant values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        TenantCode::new(&self.country_short_code).map_err(|e| {
            ConfigError::InvalidValue(format!("invalid country_short_code: {}", e))
        })?;
        if self.business_area_code.is_empty() {
            return Err(ConfigError::InvalidValue(
                "business_area_code cannot be empty".into(),
            ));
        }
        if self.local_currency.len() != 3
            || !self.local_currency.chars().all(|c| c.is_ascii_uppercase())
        {
            return Err(ConfigError::InvalidValue(
                "local_currency must be a 3-letter uppercase code".into(),
            ));
        }
        Ok(())
    }

    /// The validated tenant code.
    pub fn tenant_code(&self) -> Result<TenantCode, ConfigError> {
        TenantCode::new(&self.country_short_code)
            .map_err(|e| ConfigError::InvalidValue(e.to_string()))
    }
}

/// Downstream endpoint configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DownstreamConfig {
    /// Endpoint URL.
    pub url: String,

    /// Whether uploads are enabled.
    pub enabled: bool,
}

impl DownstreamConfig {
    /// Validate the downstream values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.url.is_empty() {
            return Err(ConfigError::InvalidValue(
                "downstream.url is required when downstream sync is enabled".into(),
            ));
        }
        Ok(())
    }
}
