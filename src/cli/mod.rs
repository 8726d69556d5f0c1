//! Command-line interface for tplsync.
//!
//! The binary is a thin operator tool over a JSON state file. Each subcommand
//! loads the state into a [`MemoryStore`](crate::store::MemoryStore), runs one
//! engine operation, prints the resulting report as JSON on stdout, and saves the
//! state back when `--write` is given. Logs go to stderr.
//!
//! # Commands
//!
//! - `propagate` - push template graphs or triggers to linked hosts
//! - `sync` - propagate the entities of chosen templates to chosen hosts
//! - `check-deps` - validate proposed trigger changes against the dependency rules
//!
//! # Global Options
//!
//! - `--verbose` - Enable debug logging
//! - `--quiet` - Disable logging
//! - `--config <FILE>` - Engine configuration file (TOML)
//!
//! # Examples
//!
//! ```bash
//! tplsync propagate --state state.json --kind graph --write
//! tplsync sync --state state.json --kind trigger --template 1 --host 10 --host 11
//! tplsync --verbose check-deps --state state.json --changes changes.json
//! ```

mod check_deps;
mod common;
mod propagate;
mod sync;

pub use common::KindArg;

use crate::config::EngineConfig;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Runtime settings derived from the global flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliConfig {
    /// Log filter directive; `None` disables logging.
    pub log_level: Option<String>,
    /// Explicit engine configuration file.
    pub config_path: Option<PathBuf>,
}

impl CliConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the global tracing subscriber, writing to stderr.
    ///
    /// `RUST_LOG` takes precedence over the configured level.
    pub fn init_logging(&self) {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else if let Some(level) = &self.log_level {
            EnvFilter::new(level)
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    }
}

/// Template inheritance propagation and trigger dependency checks.
#[derive(Parser)]
#[command(
    name = "tplsync",
    about = "Propagate template graphs and triggers to linked hosts",
    version,
    long_about = "tplsync materializes template graphs and triggers on every linked host and \
                  keeps trigger dependencies acyclic and within scope."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Disable logging; only the JSON output and errors are printed.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Engine configuration file.
    ///
    /// Defaults to `$TPLSYNC_CONFIG`, then `~/.tplsync/config.toml`, then built-in defaults.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Propagate template entities to every linked host.
    Propagate(propagate::PropagateCommand),

    /// Propagate the entities of templates to specific hosts.
    Sync(sync::SyncCommand),

    /// Validate proposed trigger changes without writing anything.
    CheckDeps(check_deps::CheckDepsCommand),
}

impl Cli {
    /// Execute the parsed command.
    pub fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(config)
    }

    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            None
        } else {
            Some("info".to_string())
        };

        CliConfig {
            log_level,
            config_path: self.config.clone(),
        }
    }

    pub fn execute_with_config(self, config: CliConfig) -> Result<()> {
        config.init_logging();

        let engine_config = EngineConfig::load(config.config_path.as_deref())?;
        engine_config.validate()?;
        tracing::debug!("Engine configuration: {engine_config:?}");

        match self.command {
            Commands::Propagate(cmd) => cmd.execute(engine_config),
            Commands::Sync(cmd) => cmd.execute(engine_config),
            Commands::CheckDeps(cmd) => cmd.execute(engine_config),
        }
    }
}
