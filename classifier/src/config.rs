//! Orchestrator configuration
//!
//! Loaded from a TOML file or from `FISKAL_*` environment variables;
//! environment variables win when both are present.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_allow_partial() -> bool {
    true
}

fn default_rule_cache_ttl_ms() -> u64 {
    5_000
}

/// Configuration for [`TransactionClassifier`](crate::TransactionClassifier)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Shared secret for gateway webhook signatures. Must be non-empty.
    #[serde(default)]
    pub gateway_secret: String,

    /// Accept partial payments (below the outstanding balance)
    #[serde(default = "default_allow_partial")]
    pub allow_partial_payments: bool,

    /// TTL of the rule snapshot cache, in milliseconds. Rules are
    /// read-mostly; budgets are never cached.
    #[serde(default = "default_rule_cache_ttl_ms")]
    pub rule_cache_ttl_ms: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            gateway_secret: String::new(),
            allow_partial_payments: default_allow_partial(),
            rule_cache_ttl_ms: default_rule_cache_ttl_ms(),
        }
    }
}

impl ClassifierConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("cannot read config file: {}", e)))?;
        toml::from_str(&raw).map_err(|e| Error::Config(format!("invalid config file: {}", e)))
    }

    /// Apply `FISKAL_*` environment variable overrides
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(secret) = std::env::var("FISKAL_GATEWAY_SECRET") {
            self.gateway_secret = secret;
        }
        if let Ok(value) = std::env::var("FISKAL_ALLOW_PARTIAL_PAYMENTS") {
            self.allow_partial_payments = value.parse().map_err(|_| {
                Error::Config(format!(
                    "FISKAL_ALLOW_PARTIAL_PAYMENTS must be true or false, got {}",
                    value
                ))
            })?;
        }
        if let Ok(value) = std::env::var("FISKAL_RULE_CACHE_TTL_MS") {
            self.rule_cache_ttl_ms = value.parse().map_err(|_| {
                Error::Config(format!(
                    "FISKAL_RULE_CACHE_TTL_MS must be an integer, got {}",
                    value
                ))
            })?;
        }
        Ok(self)
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.gateway_secret.is_empty() {
            return Err(Error::Config(
                "gateway_secret must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
