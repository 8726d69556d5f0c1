//! Generic TOML parsing with file path context.
//!
//! ```rust,no_run
//! use tplsync::config::parse_config;
//! use tplsync::config::EngineConfig;
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! let config: EngineConfig = parse_config(Path::new("tplsync.toml"))?;
//! println!("max depth: {}", config.max_inheritance_depth);
//! # Ok(())
//! # }
//! ```
//!
//! Errors carry two levels of context, the file operation and the underlying cause:
//! ```text
//! Failed to parse config file: /path/to/config.toml
//! Caused by:
//!     invalid type: string "ten", expected usize
//! ```

use anyhow::{Context, Result};
use std::path::Path;

/// Parse a TOML file into any [`serde::de::DeserializeOwned`] type.
///
/// # Errors
///
/// Returns an error if the file cannot be read or its content does not match `T`.
pub fn parse_config<T>(path: &Path) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: T = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    Ok(config)
}

/// Parse a JSON input file, such as a list of proposed changes.
pub fn parse_json<T>(path: &Path) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read input file: {}", path.display()))?;

    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse input file: {}", path.display()))
}
