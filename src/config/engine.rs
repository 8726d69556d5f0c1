//! Engine tunables loaded from TOML.
//!
//! Lookup order for [`EngineConfig::load`]:
//! 1. An explicit path (the `--config` flag)
//! 2. The `TPLSYNC_CONFIG` environment variable
//! 3. `~/.tplsync/config.toml` (`%LOCALAPPDATA%\tplsync\config.toml` on Windows)
//! 4. Built-in defaults
//!
//! ```toml
//! max_inheritance_depth = 16
//! item_link_retries = 1
//! write_batch_size = 500
//! adopt_identical = true
//! ```

use crate::config::parse_config;
use crate::core::SyncError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an alternative configuration file.
pub const CONFIG_ENV_VAR: &str = "TPLSYNC_CONFIG";

/// Tunables for propagation and dependency maintenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Upper bound on inheritance levels processed by one propagation.
    pub max_inheritance_depth: usize,
    /// How many times the item-inheritance collaborator is asked to fill
    /// missing item links before the remaining pairs are deferred.
    pub item_link_retries: usize,
    /// Maximum rows per batched insert or update.
    pub write_batch_size: usize,
    /// Adopt an authored host entity that is identical to the incoming template entity.
    /// When disabled every same-name authored entity is a collision.
    pub adopt_identical: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_inheritance_depth: 16,
            item_link_retries: 1,
            write_batch_size: 500,
            adopt_identical: true,
        }
    }
}

impl EngineConfig {
    /// Load the configuration using the documented lookup order.
    ///
    /// A missing default file is not an error; an explicit or environment path that
    /// does not exist is.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR)
            && !path.is_empty()
        {
            return Self::load_from(Path::new(&path));
        }

        match Self::default_path() {
            Ok(path) if path.exists() => Self::load_from(&path),
            _ => {
                tracing::debug!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load and validate a specific file.
    pub fn load_from(path: &Path) -> Result<Self> {
        tracing::debug!("Loading configuration from {}", path.display());
        let config: Self = parse_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Default configuration file location.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
                .join("tplsync")
        } else {
            dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
                .join(".tplsync")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_inheritance_depth == 0 {
            return Err(SyncError::Config {
                message: "max_inheritance_depth must be at least 1".to_string(),
            }
            .into());
        }
        if self.write_batch_size == 0 {
            return Err(SyncError::Config {
                message: "write_batch_size must be at least 1".to_string(),
            }
            .into());
        }
        Ok(())
    }
}
