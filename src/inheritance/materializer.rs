//! Level-by-level materialization of template entities onto inheriting hosts.
//!
//! One level takes a set of source entities, computes the hosts each must reach,
//! resolves item links, classifies every (source, host) pair, and writes all
//! inserts and updates of the level in batches. The clones that live on templates
//! become the sources of the next level. Propagation stops when a level has no
//! targets, or fails once `max_inheritance_depth` levels have produced targets.
//!
//! Clones already identical to their source produce no write, so running the
//! same propagation twice leaves the store untouched the second time.

use super::conflict::{ConflictDetector, Disposition};
use super::item_resolver::{ItemResolver, Resolved};
use super::link_graph::LinkGraph;
use super::membership::Membership;
use crate::config::EngineConfig;
use crate::core::{Result, SyncError};
use crate::model::{
    DeferredTarget, Entity, EntityId, EntityKind, HostId, ItemId, NewEntity, RowKey, SubItem,
    SubItemCounts, SyncReport,
};
use crate::store::{Catalog, EntityStore, ItemInheritance};
use std::collections::{BTreeSet, HashMap};

/// A source entity with the hosts it must reach in the current level.
struct Plan<'e, K: EntityKind> {
    source: &'e Entity<K>,
    targets: BTreeSet<HostId>,
}

/// Drives propagation against a store.
pub struct Materializer<'a, S: ?Sized> {
    store: &'a mut S,
    config: &'a EngineConfig,
}

impl<'a, S: ?Sized> Materializer<'a, S> {
    pub fn new(store: &'a mut S, config: &'a EngineConfig) -> Self {
        Self {
            store,
            config,
        }
    }

    /// Propagate `sources` down the template graph.
    ///
    /// `hosts` restricts the first level to the given hosts; deeper levels always
    /// reach every linked host.
    pub fn propagate<K: EntityKind>(
        &mut self,
        sources: Vec<Entity<K>>,
        hosts: Option<&BTreeSet<HostId>>,
        report: &mut SyncReport,
    ) -> Result<()>
    where
        S: Catalog + ItemInheritance + EntityStore<K>,
    {
        let links = LinkGraph::load(&*self.store, std::iter::empty())?;
        let mut sources = sources;
        let mut restrict = hosts.cloned();
        let mut depth = 0;

        while !sources.is_empty() {
            let span = tracing::debug_span!("level", depth, kind = K::LABEL);
            let _enter = span.enter();

            let Some(next) =
                self.materialize_level(&links, &sources, restrict.as_ref(), depth, report)?
            else {
                break;
            };
            depth += 1;
            report.levels = report.levels.max(depth);
            sources = next;
            restrict = None;
        }
        Ok(())
    }

    fn materialize_level<K: EntityKind>(
        &mut self,
        links: &LinkGraph,
        sources: &[Entity<K>],
        restrict: Option<&BTreeSet<HostId>>,
        depth: usize,
        report: &mut SyncReport,
    ) -> Result<Option<Vec<Entity<K>>>>
    where
        S: Catalog + ItemInheritance + EntityStore<K>,
    {
        let mut membership =
            Membership::load(&*self.store, sources.iter().flat_map(Entity::item_ids))?;
        let plans = fan_out(links, &membership, sources, restrict)?;
        if plans.is_empty() {
            return Ok(None);
        }
        if depth >= self.config.max_inheritance_depth {
            return Err(SyncError::InheritanceDepthExceeded {
                kind: K::LABEL,
                max: self.config.max_inheritance_depth,
            }
            .into());
        }

        let template_items: Vec<ItemId> = plans
            .iter()
            .flat_map(|plan| plan.source.item_ids())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let hosts: Vec<HostId> = plans
            .iter()
            .flat_map(|plan| plan.targets.iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        tracing::debug!(
            "Propagating {} {} entities to {} hosts",
            plans.len(),
            K::LABEL,
            hosts.len()
        );

        let resolver = self.resolve_items(&plans, &template_items, &hosts)?;

        let source_ids: Vec<EntityId> = plans.iter().map(|plan| plan.source.id).collect();
        let clones = EntityStore::<K>::clones_of(&*self.store, &source_ids)?;
        let names: Vec<String> = plans
            .iter()
            .map(|plan| plan.source.name.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let named = EntityStore::<K>::entities_named(&*self.store, &names, &hosts)?;
        membership.extend(&*self.store, clones.iter().chain(&named).flat_map(Entity::item_ids))?;

        let planned: Vec<(&Entity<K>, &BTreeSet<HostId>)> =
            plans.iter().map(|plan| (plan.source, &plan.targets)).collect();
        let sources: Vec<&Entity<K>> = plans.iter().map(|plan| plan.source).collect();
        let detector =
            ConflictDetector::new(clones, named, &membership, self.config.adopt_identical)
                .with_sources(&sources);
        detector.check_batch(&planned, links)?;

        let mut inserts: Vec<(RowKey, NewEntity<K>)> = Vec::new();
        let mut insert_hosts: HashMap<RowKey, HostId> = HashMap::new();
        let mut updates: Vec<Entity<K>> = Vec::new();
        let mut next: Vec<(EntityId, HostId)> = Vec::new();
        let mut counts = SubItemCounts::default();

        for plan in &plans {
            let source = plan.source;
            let mut resolved_any = false;
            let mut first_missing = None;

            for host in plan.targets.iter().copied() {
                let resolved = match resolver.resolve_entity(source, host) {
                    Ok(resolved) => resolved,
                    Err(item) => {
                        first_missing.get_or_insert((item, host));
                        let missing_items: Vec<ItemId> =
                            resolver.missing(source, host).into_iter().collect();
                        tracing::warn!(
                            "Deferring {} \"{}\" on {}: {} item(s) not linked",
                            K::LABEL,
                            source.name,
                            links.name(host),
                            missing_items.len()
                        );
                        report.deferred.push(DeferredTarget {
                            entity: source.id,
                            name: source.name.clone(),
                            host,
                            host_name: links.name(host),
                            missing_items,
                        });
                        continue;
                    }
                };
                resolved_any = true;

                match detector.classify(source, host, &resolved, links)? {
                    Disposition::Create => {
                        let key = RowKey(inserts.len());
                        counts.inserted += resolved.items.len();
                        insert_hosts.insert(key, host);
                        inserts.push((
                            key,
                            NewEntity {
                                name: source.name.clone(),
                                origin_id: Some(source.id),
                                flags: source.flags,
                                header: resolved.header,
                                items: resolved.items,
                            },
                        ));
                    }
                    Disposition::Update(existing) => {
                        match refresh(&existing, source, resolved) {
                            Some((row, diff)) => {
                                counts.add(diff);
                                updates.push(row);
                                report.updated += 1;
                            }
                            None => report.unchanged += 1,
                        }
                        next.push((existing.id, host));
                    }
                    Disposition::Adopt(existing) => {
                        if let Some((row, diff)) = refresh(&existing, source, resolved) {
                            counts.add(diff);
                            updates.push(row);
                        }
                        report.adopted += 1;
                        next.push((existing.id, host));
                    }
                }
            }

            if !resolved_any && let Some((item, host)) = first_missing {
                return Err(SyncError::UnresolvedItemLink {
                    kind: K::LABEL,
                    name: source.name.clone(),
                    item: membership.item_key(item),
                    host: links.name(host),
                }
                .into());
            }
        }

        let created = inserts.len();
        for batch in batches(inserts, self.config.write_batch_size) {
            for (key, id) in EntityStore::<K>::insert_entities(&mut *self.store, batch)? {
                if let Some(host) = insert_hosts.get(&key) {
                    next.push((id, *host));
                }
            }
        }
        for batch in batches(updates, self.config.write_batch_size) {
            EntityStore::<K>::update_entities(&mut *self.store, batch)?;
        }
        report.created += created;
        report.sub_items.add(counts);

        let next_ids: Vec<EntityId> = next
            .into_iter()
            .filter(|(_, host)| links.is_template(*host))
            .map(|(id, _)| id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        Ok(Some(EntityStore::<K>::entities(&*self.store, &next_ids)?))
    }

    /// Load item links, asking the item-inheritance collaborator to fill gaps.
    fn resolve_items<K: EntityKind>(
        &mut self,
        plans: &[Plan<'_, K>],
        template_items: &[ItemId],
        hosts: &[HostId],
    ) -> Result<ItemResolver>
    where
        S: Catalog + ItemInheritance,
    {
        let mut resolver = ItemResolver::load(&*self.store, template_items, hosts)?;

        for attempt in 0..self.config.item_link_retries {
            let mut missing_items = BTreeSet::new();
            let mut missing_hosts = BTreeSet::new();
            for plan in plans {
                for host in &plan.targets {
                    let missing = resolver.missing(plan.source, *host);
                    if !missing.is_empty() {
                        missing_items.extend(missing);
                        missing_hosts.insert(*host);
                    }
                }
            }
            if missing_items.is_empty() {
                break;
            }

            let missing_items: Vec<ItemId> = missing_items.into_iter().collect();
            let missing_hosts: Vec<HostId> = missing_hosts.into_iter().collect();
            let created = self.store.inherit_items(&missing_items, &missing_hosts)?;
            tracing::debug!(
                "Attempt {}: requested {} item links on {} hosts, {} created",
                attempt + 1,
                missing_items.len(),
                missing_hosts.len(),
                created
            );
            if created == 0 {
                break;
            }
            resolver = ItemResolver::load(&*self.store, template_items, hosts)?;
        }
        Ok(resolver)
    }
}

/// Target hosts of every template-owned source.
fn fan_out<'e, K: EntityKind>(
    links: &LinkGraph,
    membership: &Membership,
    sources: &'e [Entity<K>],
    restrict: Option<&BTreeSet<HostId>>,
) -> Result<Vec<Plan<'e, K>>> {
    let mut plans = Vec::new();
    for source in sources {
        let owners = membership.hosts_of(source);
        if owners.is_empty() || !owners.iter().all(|owner| links.is_template(*owner)) {
            continue;
        }

        // every owning template must reach the same hosts
        let mut linkages = owners.iter().map(|owner| links.targets(*owner));
        let Some(linked) = linkages.next() else {
            continue;
        };
        if linkages.any(|other| other != linked) {
            return Err(SyncError::InconsistentLinkage {
                kind: K::LABEL,
                name: source.name.clone(),
            }
            .into());
        }

        let targets: BTreeSet<HostId> = linked
            .into_iter()
            .filter(|host| restrict.is_none_or(|allowed| allowed.contains(host)))
            .collect();
        if !targets.is_empty() {
            plans.push(Plan {
                source,
                targets,
            });
        }
    }
    Ok(plans)
}

/// Rebuild `existing` from its source. Returns `None` when nothing would change.
fn refresh<K: EntityKind>(
    existing: &Entity<K>,
    source: &Entity<K>,
    resolved: Resolved<K>,
) -> Option<(Entity<K>, SubItemCounts)> {
    let (items, diff) = diff_sub_items(&existing.items, resolved.items);
    let row = Entity {
        id: existing.id,
        name: source.name.clone(),
        origin_id: Some(source.id),
        flags: source.flags,
        header: resolved.header,
        items,
    };
    let unchanged = diff.total() == 0
        && row.name == existing.name
        && row.origin_id == existing.origin_id
        && row.flags == existing.flags
        && row.header == existing.header;
    (!unchanged).then_some((row, diff))
}

/// Match desired sub-items against stored ones by item, keeping the stored ids.
///
/// A stored row with the same item and ordinal is preferred; otherwise the first
/// unused row with the same item is reused. Unmatched stored rows are deleted.
pub fn diff_sub_items<K: EntityKind>(
    existing: &[SubItem<K>],
    desired: Vec<SubItem<K>>,
) -> (Vec<SubItem<K>>, SubItemCounts) {
    let mut unused: Vec<&SubItem<K>> = existing.iter().collect();
    let mut counts = SubItemCounts::default();
    let mut items = Vec::with_capacity(desired.len());

    for mut wanted in desired {
        let position = unused
            .iter()
            .position(|old| old.item_id == wanted.item_id && old.ordinal == wanted.ordinal)
            .or_else(|| unused.iter().position(|old| old.item_id == wanted.item_id));
        match position {
            Some(position) => {
                let old = unused.remove(position);
                wanted.id = old.id;
                if old.ordinal != wanted.ordinal || old.attrs != wanted.attrs {
                    counts.updated += 1;
                }
            }
            None => {
                wanted.id = None;
                counts.inserted += 1;
            }
        }
        items.push(wanted);
    }
    counts.deleted = unused.len();
    (items, counts)
}

/// Split `rows` into chunks of at most `size` rows.
pub(crate) fn batches<T>(rows: Vec<T>, size: usize) -> Vec<Vec<T>> {
    let size = size.max(1);
    let mut out = Vec::new();
    let mut rows = rows.into_iter().peekable();
    while rows.peek().is_some() {
        out.push(rows.by_ref().take(size).collect());
    }
    out
}
