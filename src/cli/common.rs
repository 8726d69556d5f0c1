//! Arguments and helpers shared by the subcommands.

use crate::model::{EntityId, HostId};
use crate::store::MemoryStore;
use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;

/// Entity kind selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Graph,
    Trigger,
}

/// State file handling common to every command that writes.
#[derive(Debug, Clone, Args)]
pub struct StateArgs {
    /// JSON state file holding hosts, links, items, graphs, triggers and dependencies.
    #[arg(long, value_name = "FILE")]
    pub state: PathBuf,

    /// Save the resulting state back to the state file.
    ///
    /// Without this flag the command is a dry run: the report is printed and the
    /// state file is left untouched.
    #[arg(long)]
    pub write: bool,
}

impl StateArgs {
    pub fn load(&self) -> Result<MemoryStore> {
        MemoryStore::load(&self.state)
    }

    /// Persist `store` when `--write` was given.
    pub fn finish(&self, store: &MemoryStore) -> Result<()> {
        if self.write {
            store.save(&self.state)?;
            tracing::info!("Saved state to {}", self.state.display());
        } else {
            tracing::debug!("Dry run, state file not written");
        }
        Ok(())
    }
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let output = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{output}");
    Ok(())
}

pub fn entity_ids(ids: &[u64]) -> Vec<EntityId> {
    ids.iter().copied().map(EntityId).collect()
}

pub fn host_ids(ids: &[u64]) -> Vec<HostId> {
    ids.iter().copied().map(HostId).collect()
}
