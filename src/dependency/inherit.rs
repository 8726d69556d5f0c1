//! Mirroring of template trigger dependencies onto clones.
//!
//! When `down` depends on `up` on a template, every clone of `down` depends on the
//! clone of `up` living on the same host. When `up` is not owned by templates the
//! clones depend on `up` itself. Each clone level is handled in turn, so edges follow
//! the same template chain the triggers were propagated through.

use super::graph::DependencyGraph;
use crate::config::EngineConfig;
use crate::core::{Result, SyncError};
use crate::inheritance::{LinkGraph, Membership};
use crate::model::{DependencyId, EdgeCounts, Entity, EntityId, HostId, Trigger};
use crate::store::{Catalog, DependencyStore, EntityStore};
use std::collections::{BTreeSet, HashMap, HashSet};

type Pair = (EntityId, EntityId);

/// Applies template dependency changes to every level of clones.
pub struct DependencyInheritor<'a, S: ?Sized> {
    store: &'a mut S,
    config: &'a EngineConfig,
}

/// Clone-level counterparts of one level of template pairs.
#[derive(Default)]
struct Mapped {
    added: Vec<Pair>,
    removed: Vec<Pair>,
    names: HashMap<EntityId, String>,
    hosts: HashMap<EntityId, HostId>,
}

impl Mapped {
    fn name(&self, id: EntityId) -> String {
        self.names.get(&id).cloned().unwrap_or_else(|| id.to_string())
    }
}

impl<'a, S> DependencyInheritor<'a, S>
where
    S: Catalog + DependencyStore + EntityStore<Trigger> + ?Sized,
{
    pub fn new(store: &'a mut S, config: &'a EngineConfig) -> Self {
        Self {
            store,
            config,
        }
    }

    /// Mirror `added` and `removed` `(down, up)` pairs onto the clones of `down`.
    ///
    /// `restrict` limits the first level to clones on the given hosts.
    pub fn inherit(
        &mut self,
        added: &[Pair],
        removed: &[Pair],
        restrict: Option<&BTreeSet<HostId>>,
        counts: &mut EdgeCounts,
    ) -> Result<()> {
        let mut added = added.to_vec();
        let mut removed = removed.to_vec();
        let mut restrict = restrict.cloned();
        let mut depth = 0;

        while !added.is_empty() || !removed.is_empty() {
            let span = tracing::debug_span!("dependency_level", depth);
            let _enter = span.enter();

            let mapped = self.map_level(&added, &removed, restrict.as_ref())?;
            if mapped.added.is_empty() && mapped.removed.is_empty() {
                break;
            }
            if depth >= self.config.max_inheritance_depth {
                return Err(SyncError::InheritanceDepthExceeded {
                    kind: "trigger dependency",
                    max: self.config.max_inheritance_depth,
                }
                .into());
            }

            self.apply(&mapped, counts)?;

            let links = LinkGraph::load(&*self.store, mapped.hosts.values().copied())?;
            let on_template = |pair: &Pair| {
                mapped.hosts.get(&pair.0).is_some_and(|host| links.is_template(*host))
            };
            added = mapped.added.iter().copied().filter(on_template).collect();
            removed = mapped.removed.iter().copied().filter(on_template).collect();
            restrict = None;
            depth += 1;
        }
        Ok(())
    }

    /// Translate template pairs into pairs between clones.
    fn map_level(
        &self,
        added: &[Pair],
        removed: &[Pair],
        restrict: Option<&BTreeSet<HostId>>,
    ) -> Result<Mapped> {
        let downs: Vec<EntityId> = added
            .iter()
            .chain(removed)
            .map(|(down, _)| *down)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let ups: Vec<EntityId> = added
            .iter()
            .chain(removed)
            .map(|(_, up)| *up)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let down_clones = EntityStore::<Trigger>::clones_of(&*self.store, &downs)?;
        let up_clones = EntityStore::<Trigger>::clones_of(&*self.store, &ups)?;
        let up_sources = EntityStore::<Trigger>::entities(&*self.store, &ups)?;
        let membership = Membership::load(
            &*self.store,
            down_clones.iter().chain(&up_clones).chain(&up_sources).flat_map(Entity::item_ids),
        )?;
        let involved: BTreeSet<HostId> = up_sources
            .iter()
            .chain(&down_clones)
            .flat_map(|trigger| membership.hosts_of(trigger))
            .collect();
        let links = LinkGraph::load(&*self.store, involved)?;

        let template_owned: HashSet<EntityId> = up_sources
            .iter()
            .filter(|trigger| {
                let hosts = membership.hosts_of(*trigger);
                !hosts.is_empty() && hosts.iter().all(|host| links.is_template(*host))
            })
            .map(|trigger| trigger.id)
            .collect();

        let mut up_on_host: HashMap<(EntityId, HostId), &Entity<Trigger>> = HashMap::new();
        for clone in &up_clones {
            if let Some(origin) = clone.origin_id {
                for host in membership.hosts_of(clone) {
                    up_on_host.insert((origin, host), clone);
                }
            }
        }

        let mut clones_by_origin: HashMap<EntityId, Vec<(&Entity<Trigger>, HostId)>> =
            HashMap::new();
        for clone in &down_clones {
            let Some(origin) = clone.origin_id else {
                continue;
            };
            for host in membership.hosts_of(clone) {
                if restrict.is_none_or(|allowed| allowed.contains(&host)) {
                    clones_by_origin.entry(origin).or_default().push((clone, host));
                }
            }
        }

        let mut mapped = Mapped::default();
        for trigger in up_sources.iter().chain(&up_clones) {
            mapped.names.insert(trigger.id, trigger.name.clone());
        }

        let map_pair = |(down, up): Pair, mapped: &mut Mapped| -> Vec<Pair> {
            let mut pairs = Vec::new();
            for (clone, host) in clones_by_origin.get(&down).into_iter().flatten() {
                let target = if template_owned.contains(&up) {
                    match up_on_host.get(&(up, *host)) {
                        Some(up_clone) => up_clone.id,
                        None => {
                            tracing::debug!(
                                "No clone of trigger {up} on {}, skipping dependency",
                                links.name(*host)
                            );
                            continue;
                        }
                    }
                } else {
                    up
                };
                mapped.names.insert(clone.id, clone.name.clone());
                mapped.hosts.insert(clone.id, *host);
                pairs.push((clone.id, target));
            }
            pairs
        };

        for pair in added {
            let pairs = map_pair(*pair, &mut mapped);
            mapped.added.extend(pairs);
        }
        for pair in removed {
            let pairs = map_pair(*pair, &mut mapped);
            mapped.removed.extend(pairs);
        }
        mapped.added.sort_unstable();
        mapped.added.dedup();
        mapped.removed.sort_unstable();
        mapped.removed.dedup();
        Ok(mapped)
    }

    /// Delete and insert the clone edges of one level.
    fn apply(&mut self, mapped: &Mapped, counts: &mut EdgeCounts) -> Result<()> {
        let clone_ids: Vec<EntityId> = mapped.hosts.keys().copied().collect();
        let existing: HashMap<Pair, DependencyId> = self
            .store
            .edges_by_down(&clone_ids)?
            .into_iter()
            .map(|edge| ((edge.trigger_down, edge.trigger_up), edge.id))
            .collect();

        let delete: Vec<DependencyId> =
            mapped.removed.iter().filter_map(|pair| existing.get(pair).copied()).collect();
        let insert: Vec<Pair> = mapped
            .added
            .iter()
            .copied()
            .filter(|pair| !existing.contains_key(pair))
            .collect();

        if !insert.is_empty() {
            let seeds: Vec<EntityId> = insert.iter().flat_map(|(down, up)| [*down, *up]).collect();
            let skip: HashSet<DependencyId> = delete.iter().copied().collect();
            let mut graph = DependencyGraph::load(&*self.store, &seeds, &skip)?;
            let links = LinkGraph::load(&*self.store, mapped.hosts.values().copied())?;
            for (down, up) in &insert {
                if *down == *up || graph.path(*up, *down).is_some() {
                    let path = graph.path(*up, *down).unwrap_or_default();
                    let host = mapped.hosts.get(down).map_or_else(String::new, |host| links.name(*host));
                    let chain = std::iter::once(*down)
                        .chain(path)
                        .map(|id| mapped.name(id))
                        .collect::<Vec<_>>()
                        .join(" -> ");
                    return Err(SyncError::DependencyCycle {
                        trigger: mapped.name(*down),
                        trigger_up: mapped.name(*up),
                        chain: format!("{chain} on \"{host}\""),
                    }
                    .into());
                }
                graph.add_dependency(*down, *up);
            }
        }

        let batch_size = self.config.write_batch_size.max(1);
        for chunk in delete.chunks(batch_size) {
            self.store.delete_edges(chunk)?;
        }
        for chunk in insert.chunks(batch_size) {
            self.store.insert_edges(chunk)?;
        }
        tracing::debug!(
            "Inherited dependencies: {} inserted, {} deleted",
            insert.len(),
            delete.len()
        );
        counts.inserted += insert.len();
        counts.deleted += delete.len();
        Ok(())
    }
}
