//! `tplsync check-deps`: validate trigger changes against the dependency rules.

use super::common::print_json;
use crate::config::{EngineConfig, parse_json};
use crate::dependency::TriggerChange;
use crate::engine::{Engine, RequestContext};
use crate::store::MemoryStore;
use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

/// Check proposed trigger changes without writing anything.
///
/// The changes file is a JSON list of objects with `trigger_id` and optional
/// `items` and `dependencies` lists. On success the edge writes the changes
/// would cause are printed.
#[derive(Debug, Args)]
pub struct CheckDepsCommand {
    /// JSON state file.
    #[arg(long, value_name = "FILE")]
    state: PathBuf,

    /// JSON file with the proposed trigger changes.
    #[arg(long, value_name = "FILE")]
    changes: PathBuf,
}

impl CheckDepsCommand {
    pub fn execute(self, config: EngineConfig) -> Result<()> {
        let mut store = MemoryStore::load(&self.state)?;
        let changes: Vec<TriggerChange> = parse_json(&self.changes)?;

        let ctx = RequestContext::new("cli");
        let plan = Engine::new(&mut store, config).check_dependency_consistency(&ctx, &changes)?;
        print_json(&plan)
    }
}
