//! `tplsync sync`: bring hosts in line with the templates they are linked to.

use super::common::{KindArg, StateArgs, host_ids, print_json};
use crate::config::EngineConfig;
use crate::engine::{Engine, RequestContext};
use crate::model::{EntityKind, Graph, Trigger};
use crate::store::MemoryStore;
use crate::store::memory::KindTable;
use anyhow::Result;
use clap::Args;

/// Propagate every entity of the given templates to the given hosts.
#[derive(Debug, Args)]
pub struct SyncCommand {
    #[command(flatten)]
    state: StateArgs,

    /// Entity kind to synchronize.
    #[arg(long, value_enum)]
    kind: KindArg,

    /// Template whose entities are synchronized.
    #[arg(long = "template", value_name = "ID", required = true)]
    templates: Vec<u64>,

    /// Host receiving the template entities.
    #[arg(long = "host", value_name = "ID", required = true)]
    hosts: Vec<u64>,
}

impl SyncCommand {
    pub fn execute(self, config: EngineConfig) -> Result<()> {
        match self.kind {
            KindArg::Graph => self.run::<Graph>(config),
            KindArg::Trigger => self.run::<Trigger>(config),
        }
    }

    fn run<K: EntityKind>(&self, config: EngineConfig) -> Result<()>
    where
        MemoryStore: KindTable<K>,
    {
        let mut store = self.state.load()?;
        let ctx = RequestContext::new("cli");
        let report = Engine::new(&mut store, config).sync_templates::<K>(
            &ctx,
            &host_ids(&self.templates),
            &host_ids(&self.hosts),
        )?;

        self.state.finish(&store)?;
        print_json(&report)
    }
}
