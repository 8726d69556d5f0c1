//! `tplsync propagate`: push template entities down to linked hosts.

use super::common::{KindArg, StateArgs, entity_ids, host_ids, print_json};
use crate::config::EngineConfig;
use crate::engine::{Engine, RequestContext};
use crate::model::{EntityKind, Graph, Trigger};
use crate::store::MemoryStore;
use crate::store::memory::KindTable;
use anyhow::Result;
use clap::Args;

/// Propagate template graphs or triggers to every linked host.
#[derive(Debug, Args)]
pub struct PropagateCommand {
    #[command(flatten)]
    state: StateArgs,

    /// Entity kind to propagate.
    #[arg(long, value_enum)]
    kind: KindArg,

    /// Entity to propagate. Defaults to every authored template entity.
    #[arg(long = "entity", value_name = "ID")]
    entities: Vec<u64>,

    /// Restrict the first level of propagation to these hosts.
    #[arg(long = "host", value_name = "ID")]
    hosts: Vec<u64>,
}

impl PropagateCommand {
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
        let ids = if self.entities.is_empty() {
            store.template_roots::<K>()
        } else {
            entity_ids(&self.entities)
        };
        let hosts = host_ids(&self.hosts);
        tracing::debug!("Propagating {} {} entities", ids.len(), K::LABEL);

        let ctx = RequestContext::new("cli");
        let report = Engine::new(&mut store, config).propagate::<K>(
            &ctx,
            &ids,
            (!hosts.is_empty()).then_some(hosts.as_slice()),
        )?;

        self.state.finish(&store)?;
        print_json(&report)
    }
}
