//! Engine configuration, loaded from TOML.
//!
//! ```toml
//! seed_balance = 100000.0
//! default_window = 4
//! batch_limit = 10
//! key_lookup_weeks = 2
//! weeks_per_year = 52
//!
//! [fallback]
//! key_lookup = true
//! full_scan = true
//!
//! [snapshot]
//! window = 8
//! ```
//!
//! Every key is optional.

use std::path::Path;

use allocboard_core::{FetchPolicy, SnapshotLoader, SEED_BALANCE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::leaderboard::DEFAULT_WINDOW;
use crate::returns::WEEKS_PER_YEAR;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Which fallback tiers may run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub key_lookup: bool,
    pub full_scan: bool,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            key_lookup: true,
            full_scan: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Load weekly balances only for this many recently settled weeks.
    pub window: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub seed_balance: f64,
    pub default_window: usize,
    pub batch_limit: usize,
    pub key_lookup_weeks: usize,
    pub weeks_per_year: u32,
    pub fallback: FallbackConfig,
    pub snapshot: SnapshotConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed_balance: SEED_BALANCE,
            default_window: DEFAULT_WINDOW,
            batch_limit: allocboard_core::data::DEFAULT_BATCH_LIMIT,
            key_lookup_weeks: 2,
            weeks_per_year: WEEKS_PER_YEAR,
            fallback: FallbackConfig::default(),
            snapshot: SnapshotConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.seed_balance.is_finite() || self.seed_balance < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "seed_balance must be a non-negative number, got {}",
                self.seed_balance
            )));
        }
        if self.batch_limit == 0 {
            return Err(ConfigError::Invalid("batch_limit must be at least 1".into()));
        }
        if self.weeks_per_year == 0 {
            return Err(ConfigError::Invalid("weeks_per_year must be at least 1".into()));
        }
        if self.key_lookup_weeks == 0 {
            return Err(ConfigError::Invalid("key_lookup_weeks must be at least 1".into()));
        }
        if self.default_window == 0 {
            return Err(ConfigError::Invalid("default_window must be at least 1".into()));
        }
        if self.snapshot.window == Some(0) {
            return Err(ConfigError::Invalid("snapshot.window must be at least 1".into()));
        }
        Ok(())
    }

    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            full_scan: self.fallback.full_scan,
            key_lookup: self.fallback.key_lookup,
            key_lookup_weeks: self.key_lookup_weeks,
            batch_limit: self.batch_limit,
        }
    }

    pub fn snapshot_loader(&self) -> SnapshotLoader {
        SnapshotLoader::new()
            .with_window(self.snapshot.window)
            .with_seed_balance(self.seed_balance)
    }
}
