//! Orchestration of template propagation requests.
//!
//! [`Engine`] is the entry point used by the CLI and by library callers. Every
//! operation runs as one store transaction: all validation happens against the
//! proposed state, writes are issued in batches, and the first rejection rolls the
//! whole request back.
//!
//! # Example
//!
//! ```rust,no_run
//! use tplsync::config::EngineConfig;
//! use tplsync::engine::{Engine, RequestContext};
//! use tplsync::model::{EntityId, Graph};
//! use tplsync::store::MemoryStore;
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut store = MemoryStore::load("state.json".as_ref())?;
//! let mut engine = Engine::new(&mut store, EngineConfig::default());
//! let report = engine.propagate::<Graph>(&RequestContext::system(), &[EntityId(1)], None)?;
//! println!("{} clones created", report.created);
//! # Ok(())
//! # }
//! ```

pub mod context;
mod ops;

pub use context::RequestContext;

use crate::config::EngineConfig;
use crate::core::Result;
use crate::dependency::{DependencyChecker, DependencyPlan, TriggerChange};
use crate::model::{EntityDraft, EntityId, EntityKind, HostId, SyncReport};
use crate::store::{EntityStore, Store};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What happens to clones when their template is unlinked from a host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlinkMode {
    /// Delete the clones and everything derived from them.
    #[default]
    Clear,
    /// Keep the clones as authored entities.
    Keep,
}

/// Result of an operation that writes authored entities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Applied {
    /// Ids of the authored entities, in request order.
    pub ids: Vec<EntityId>,
    pub report: SyncReport,
}

/// Propagation engine bound to a store.
pub struct Engine<'s, S> {
    store: &'s mut S,
    config: EngineConfig,
}

impl<'s, S: Store> Engine<'s, S> {
    pub fn new(store: &'s mut S, config: EngineConfig) -> Self {
        Self {
            store,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &*self.store
    }

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create authored entities, validate their dependencies, and propagate them.
    pub fn create<K: EntityKind>(
        &mut self,
        ctx: &RequestContext,
        drafts: Vec<EntityDraft<K>>,
    ) -> Result<Applied>
    where
        S: EntityStore<K>,
    {
        let (ids, report) = self.run(ctx, "create", K::LABEL, |store, config, report| {
            ops::create(store, config, drafts, report)
        })?;
        Ok(Applied {
            ids,
            report,
        })
    }

    /// Update authored entities in place and refresh every clone derived from them.
    pub fn update<K: EntityKind>(
        &mut self,
        ctx: &RequestContext,
        drafts: Vec<EntityDraft<K>>,
    ) -> Result<Applied>
    where
        S: EntityStore<K>,
    {
        let (ids, report) = self.run(ctx, "update", K::LABEL, |store, config, report| {
            ops::update(store, config, drafts, report)
        })?;
        Ok(Applied {
            ids,
            report,
        })
    }

    /// Propagate every entity of `templates` to `hosts`, along with trigger dependencies.
    pub fn sync_templates<K: EntityKind>(
        &mut self,
        ctx: &RequestContext,
        templates: &[HostId],
        hosts: &[HostId],
    ) -> Result<SyncReport>
    where
        S: EntityStore<K>,
    {
        let ((), report) = self.run(ctx, "sync", K::LABEL, |store, config, report| {
            ops::sync_templates::<K, S>(store, config, templates, hosts, report)
        })?;
        Ok(report)
    }

    /// Delete authored entities together with all their clones.
    pub fn delete<K: EntityKind>(
        &mut self,
        ctx: &RequestContext,
        ids: &[EntityId],
    ) -> Result<SyncReport>
    where
        S: EntityStore<K>,
    {
        let ((), report) = self.run(ctx, "delete", K::LABEL, |store, config, report| {
            ops::delete::<K, S>(store, config, ids, report)
        })?;
        Ok(report)
    }

    /// Apply the consequences of unlinking `templates` from `hosts` to their clones.
    ///
    /// The template links themselves are maintained by the caller.
    pub fn unlink_templates<K: EntityKind>(
        &mut self,
        ctx: &RequestContext,
        templates: &[HostId],
        hosts: &[HostId],
        mode: UnlinkMode,
    ) -> Result<SyncReport>
    where
        S: EntityStore<K>,
    {
        let ((), report) = self.run(ctx, "unlink", K::LABEL, |store, config, report| {
            ops::unlink_templates::<K, S>(store, config, templates, hosts, mode, report)
        })?;
        Ok(report)
    }

    /// Propagate the given entities down the template graph.
    ///
    /// `hosts` restricts the first level of propagation to those hosts.
    pub fn propagate<K: EntityKind>(
        &mut self,
        ctx: &RequestContext,
        ids: &[EntityId],
        hosts: Option<&[HostId]>,
    ) -> Result<SyncReport>
    where
        S: EntityStore<K>,
    {
        let restrict: Option<BTreeSet<HostId>> = hosts.map(|hosts| hosts.iter().copied().collect());
        let ((), report) = self.run(ctx, "propagate", K::LABEL, |store, config, report| {
            ops::propagate::<K, S>(store, config, ids, restrict.as_ref(), report)
        })?;
        Ok(report)
    }

    /// Validate trigger changes without writing anything.
    pub fn check_dependency_consistency(
        &self,
        ctx: &RequestContext,
        changes: &[TriggerChange],
    ) -> Result<DependencyPlan> {
        let span = tracing::info_span!(
            "request",
            operation = "check_dependencies",
            request_id = %ctx.request_id,
            actor = %ctx.actor
        );
        let _enter = span.enter();
        let plan = DependencyChecker::new(&*self.store).check(changes)?;
        tracing::info!(
            "Dependency check passed for {} triggers: {} edges to insert, {} to delete",
            changes.len(),
            plan.insert.len(),
            plan.delete.len()
        );
        Ok(plan)
    }

    fn run<T, F>(
        &mut self,
        ctx: &RequestContext,
        operation: &'static str,
        kind: &'static str,
        f: F,
    ) -> Result<(T, SyncReport)>
    where
        F: FnOnce(&mut S, &EngineConfig, &mut SyncReport) -> Result<T>,
    {
        let span = tracing::info_span!(
            "request",
            operation,
            kind,
            request_id = %ctx.request_id,
            actor = %ctx.actor
        );
        let _enter = span.enter();

        let config = &self.config;
        let result = self.store.transaction(|store| {
            let mut report = SyncReport::default();
            let value = f(store, config, &mut report)?;
            Ok((value, report))
        });

        match &result {
            Ok((_, report)) => tracing::info!(
                "{operation} {kind}: {} created, {} updated, {} adopted, {} unchanged, {} deleted, {} deferred",
                report.created,
                report.updated,
                report.adopted,
                report.unchanged,
                report.deleted,
                report.deferred.len()
            ),
            Err(error) => tracing::warn!("{operation} {kind} rejected: {error}"),
        }
        result
    }
}
