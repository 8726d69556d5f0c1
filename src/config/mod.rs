//! Configuration for tplsync
//!
//! - `parser` - generic TOML and JSON parsing with file path context
//! - `engine` - [`EngineConfig`], the tunables of the propagation engine

pub mod engine;
pub mod parser;

pub use engine::{CONFIG_ENV_VAR, EngineConfig};
pub use parser::{parse_config, parse_json};
