//! Bodies of the engine operations. Each runs inside the transaction opened by
//! [`Engine`](super::Engine) and reports its writes into the shared [`SyncReport`].

use super::UnlinkMode;
use crate::config::EngineConfig;
use crate::core::{CollisionReason, Result, SyncError};
use crate::dependency::{DependencyChecker, DependencyInheritor, DependencyPlan, TriggerChange};
use crate::inheritance::materializer::batches;
use crate::inheritance::{LinkGraph, Materializer, Membership, diff_sub_items};
use crate::model::{
    DependencyId, Entity, EntityDraft, EntityId, EntityKind, HostId, NewEntity, RowKey, SyncReport,
};
use crate::store::{EntityStore, Store};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

type Pair = (EntityId, EntityId);

pub(super) fn create<K, S>(
    store: &mut S,
    config: &EngineConfig,
    drafts: Vec<EntityDraft<K>>,
    report: &mut SyncReport,
) -> Result<Vec<EntityId>>
where
    K: EntityKind,
    S: Store + EntityStore<K>,
{
    let membership = Membership::load(&*store, drafts.iter().flat_map(EntityDraft::item_ids))?;
    let hosts = drafts
        .iter()
        .map(|draft| validate_draft(draft, &membership))
        .collect::<Result<Vec<_>>>()?;
    let links = LinkGraph::load(&*store, hosts.iter().flatten().copied())?;
    check_names(&*store, &drafts, &hosts, &HashMap::new(), &links)?;

    let rows: Vec<(RowKey, NewEntity<K>)> = drafts
        .iter()
        .enumerate()
        .map(|(index, draft)| {
            (
                RowKey(index),
                NewEntity {
                    name: draft.name.clone(),
                    origin_id: None,
                    flags: draft.flags,
                    header: draft.header.clone(),
                    items: draft.items.clone(),
                },
            )
        })
        .collect();
    report.sub_items.inserted += rows.iter().map(|(_, row)| row.items.len()).sum::<usize>();

    let mut assigned: HashMap<RowKey, EntityId> = HashMap::new();
    for batch in batches(rows, config.write_batch_size) {
        assigned.extend(EntityStore::<K>::insert_entities(store, batch)?);
    }
    let ids = (0..drafts.len())
        .map(|index| {
            assigned.get(&RowKey(index)).copied().ok_or_else(|| {
                anyhow::Error::from(SyncError::Store {
                    operation: format!("insert {}", K::TABLE),
                    reason: format!("no id returned for row {index}"),
                })
            })
        })
        .collect::<Result<Vec<_>>>()?;
    report.created += ids.len();

    let mut added = Vec::new();
    if K::HAS_DEPENDENCIES {
        let changes: Vec<TriggerChange> = drafts
            .iter()
            .zip(&ids)
            .filter_map(|(draft, id)| {
                draft.dependencies.clone().map(|list| TriggerChange::dependencies(*id, list))
            })
            .collect();
        let plan = DependencyChecker::new(&*store).check(&changes)?;
        apply_plan(store, config, &plan, report)?;
        added = plan.insert;
    }

    let sources = EntityStore::<K>::entities(&*store, &ids)?;
    Materializer::new(&mut *store, config).propagate(sources, None, report)?;
    if !added.is_empty() {
        DependencyInheritor::new(&mut *store, config).inherit(
            &added,
            &[],
            None,
            &mut report.dependencies,
        )?;
    }
    Ok(ids)
}

pub(super) fn update<K, S>(
    store: &mut S,
    config: &EngineConfig,
    drafts: Vec<EntityDraft<K>>,
    report: &mut SyncReport,
) -> Result<Vec<EntityId>>
where
    K: EntityKind,
    S: Store + EntityStore<K>,
{
    let ids = drafts
        .iter()
        .map(|draft| {
            draft.id.ok_or_else(|| {
                anyhow::Error::from(SyncError::InvalidEntity {
                    kind: K::LABEL,
                    name: draft.name.clone(),
                    reason: "an id is required for updates".to_string(),
                })
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let mut unique = HashSet::new();
    if let Some(repeated) = drafts.iter().zip(&ids).find(|(_, id)| !unique.insert(**id)) {
        return Err(SyncError::InvalidEntity {
            kind: K::LABEL,
            name: repeated.0.name.clone(),
            reason: "listed more than once in the request".to_string(),
        }
        .into());
    }

    let existing = load_existing::<K, S>(&*store, &ids)?;
    if let Some(clone) = existing.iter().find(|entity| entity.is_clone()) {
        return Err(SyncError::ReadOnlyClone {
            kind: K::LABEL,
            name: clone.name.clone(),
            operation: "update",
        }
        .into());
    }

    let membership = Membership::load(
        &*store,
        drafts
            .iter()
            .flat_map(EntityDraft::item_ids)
            .chain(existing.iter().flat_map(Entity::item_ids)),
    )?;
    let hosts = drafts
        .iter()
        .map(|draft| validate_draft(draft, &membership))
        .collect::<Result<Vec<_>>>()?;

    let with_clones: HashSet<EntityId> = EntityStore::<K>::clones_of(&*store, &ids)?
        .into_iter()
        .filter_map(|clone| clone.origin_id)
        .collect();
    for ((draft, old), new_hosts) in drafts.iter().zip(&existing).zip(&hosts) {
        if with_clones.contains(&old.id) && membership.hosts_of(old) != *new_hosts {
            return Err(SyncError::InvalidEntity {
                kind: K::LABEL,
                name: draft.name.clone(),
                reason: "an entity with inherited copies cannot be moved to other hosts"
                    .to_string(),
            }
            .into());
        }
    }

    let links = LinkGraph::load(&*store, hosts.iter().flatten().copied())?;
    let previous: HashMap<EntityId, String> =
        existing.iter().map(|entity| (entity.id, entity.name.clone())).collect();
    check_names(&*store, &drafts, &hosts, &previous, &links)?;

    // dependency consistency is settled before anything is written
    let mut plan = DependencyPlan::default();
    let mut removed: Vec<Pair> = Vec::new();
    if K::HAS_DEPENDENCIES {
        let changes: Vec<TriggerChange> = drafts
            .iter()
            .zip(&existing)
            .filter_map(|(draft, old)| {
                let items = Some(draft.item_ids()).filter(|items| *items != old.item_ids());
                (items.is_some() || draft.dependencies.is_some()).then(|| TriggerChange {
                    trigger_id: old.id,
                    items,
                    dependencies: draft.dependencies.clone(),
                })
            })
            .collect();
        plan = DependencyChecker::new(&*store).check(&changes)?;
        let deleted: HashSet<DependencyId> = plan.delete.iter().copied().collect();
        removed = store
            .edges_by_down(&ids)?
            .into_iter()
            .filter(|edge| deleted.contains(&edge.id))
            .map(|edge| (edge.trigger_down, edge.trigger_up))
            .collect();
    }

    let mut rows = Vec::new();
    for (draft, old) in drafts.into_iter().zip(existing) {
        let (items, diff) = diff_sub_items(&old.items, draft.items);
        let row = Entity {
            id: old.id,
            name: draft.name,
            origin_id: None,
            flags: draft.flags,
            header: draft.header,
            items,
        };
        if diff.total() == 0
            && row.name == old.name
            && row.flags == old.flags
            && row.header == old.header
        {
            report.unchanged += 1;
            continue;
        }
        report.sub_items.add(diff);
        report.updated += 1;
        rows.push(row);
    }
    for batch in batches(rows, config.write_batch_size) {
        EntityStore::<K>::update_entities(store, batch)?;
    }
    apply_plan(store, config, &plan, report)?;

    let sources = EntityStore::<K>::entities(&*store, &ids)?;
    Materializer::new(&mut *store, config).propagate(sources, None, report)?;
    if !plan.insert.is_empty() || !removed.is_empty() {
        DependencyInheritor::new(&mut *store, config).inherit(
            &plan.insert,
            &removed,
            None,
            &mut report.dependencies,
        )?;
    }
    Ok(ids)
}

pub(super) fn sync_templates<K, S>(
    store: &mut S,
    config: &EngineConfig,
    templates: &[HostId],
    hosts: &[HostId],
    report: &mut SyncReport,
) -> Result<()>
where
    K: EntityKind,
    S: Store + EntityStore<K>,
{
    let links = LinkGraph::load(&*store, templates.iter().chain(hosts).copied())?;
    for id in templates.iter().chain(hosts) {
        if links.host(*id).is_none() {
            return Err(SyncError::EntityNotFound {
                kind: "host",
                id: id.get(),
            }
            .into());
        }
    }
    if let Some(template) = templates.iter().find(|id| !links.is_template(**id)) {
        return Err(SyncError::InvalidEntity {
            kind: "host",
            name: links.name(*template),
            reason: "not a template".to_string(),
        }
        .into());
    }

    let restrict: BTreeSet<HostId> = hosts.iter().copied().collect();
    let sources = EntityStore::<K>::entities_on_hosts(&*store, templates)?;
    let source_ids: Vec<EntityId> = sources.iter().map(|source| source.id).collect();
    tracing::debug!(
        "Syncing {} {} entities of {} templates to {} hosts",
        sources.len(),
        K::LABEL,
        templates.len(),
        restrict.len()
    );

    Materializer::new(&mut *store, config).propagate(sources, Some(&restrict), report)?;
    if K::HAS_DEPENDENCIES {
        inherit_existing(store, config, &source_ids, Some(&restrict), report)?;
    }
    Ok(())
}

pub(super) fn delete<K, S>(
    store: &mut S,
    config: &EngineConfig,
    ids: &[EntityId],
    report: &mut SyncReport,
) -> Result<()>
where
    K: EntityKind,
    S: Store + EntityStore<K>,
{
    let ids = unique(ids);
    let existing = load_existing::<K, S>(&*store, &ids)?;
    if let Some(clone) = existing.iter().find(|entity| entity.is_clone()) {
        return Err(SyncError::ReadOnlyClone {
            kind: K::LABEL,
            name: clone.name.clone(),
            operation: "delete",
        }
        .into());
    }
    remove_with_clones(store, config, &existing, report)
}

pub(super) fn unlink_templates<K, S>(
    store: &mut S,
    config: &EngineConfig,
    templates: &[HostId],
    hosts: &[HostId],
    mode: UnlinkMode,
    report: &mut SyncReport,
) -> Result<()>
where
    K: EntityKind,
    S: Store + EntityStore<K>,
{
    let source_ids: Vec<EntityId> = EntityStore::<K>::entities_on_hosts(&*store, templates)?
        .into_iter()
        .map(|source| source.id)
        .collect();
    let clones = EntityStore::<K>::clones_of(&*store, &source_ids)?;
    let membership = Membership::load(&*store, clones.iter().flat_map(Entity::item_ids))?;
    let targets: HashSet<HostId> = hosts.iter().copied().collect();
    let direct: Vec<Entity<K>> = clones
        .into_iter()
        .filter(|clone| membership.hosts_of(clone).iter().any(|host| targets.contains(host)))
        .collect();
    tracing::debug!(
        "Unlinking {} {} clones from {} hosts ({:?})",
        direct.len(),
        K::LABEL,
        targets.len(),
        mode
    );

    match mode {
        UnlinkMode::Clear => remove_with_clones(store, config, &direct, report),
        UnlinkMode::Keep => {
            let rows: Vec<Entity<K>> = direct
                .into_iter()
                .map(|mut clone| {
                    clone.origin_id = None;
                    clone
                })
                .collect();
            report.detached += rows.len();
            for batch in batches(rows, config.write_batch_size) {
                EntityStore::<K>::update_entities(store, batch)?;
            }
            Ok(())
        }
    }
}

pub(super) fn propagate<K, S>(
    store: &mut S,
    config: &EngineConfig,
    ids: &[EntityId],
    hosts: Option<&BTreeSet<HostId>>,
    report: &mut SyncReport,
) -> Result<()>
where
    K: EntityKind,
    S: Store + EntityStore<K>,
{
    let ids = unique(ids);
    let sources = load_existing::<K, S>(&*store, &ids)?;
    Materializer::new(&mut *store, config).propagate(sources, hosts, report)?;
    if K::HAS_DEPENDENCIES {
        inherit_existing(store, config, &ids, hosts, report)?;
    }
    Ok(())
}

/// Entities in the order of `ids`, failing on the first unknown id.
fn load_existing<K, S>(store: &S, ids: &[EntityId]) -> Result<Vec<Entity<K>>>
where
    K: EntityKind,
    S: EntityStore<K> + ?Sized,
{
    let mut found: HashMap<EntityId, Entity<K>> = EntityStore::<K>::entities(store, ids)?
        .into_iter()
        .map(|entity| (entity.id, entity))
        .collect();
    ids.iter()
        .map(|id| {
            found.remove(id).ok_or_else(|| {
                anyhow::Error::from(SyncError::EntityNotFound {
                    kind: K::LABEL,
                    id: id.get(),
                })
            })
        })
        .collect()
}

fn unique(ids: &[EntityId]) -> Vec<EntityId> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

/// Check an authored draft and return the hosts it lives on.
fn validate_draft<K: EntityKind>(
    draft: &EntityDraft<K>,
    membership: &Membership,
) -> Result<BTreeSet<HostId>> {
    let invalid = |reason: String| -> Result<BTreeSet<HostId>> {
        Err(SyncError::InvalidEntity {
            kind: K::LABEL,
            name: draft.name.clone(),
            reason,
        }
        .into())
    };

    if draft.name.trim().is_empty() {
        return invalid("name cannot be empty".to_string());
    }
    if draft.items.is_empty() {
        return invalid("at least one item is required".to_string());
    }
    if draft.dependencies.is_some() && !K::HAS_DEPENDENCIES {
        return invalid(format!("a {} cannot have dependencies", K::LABEL));
    }
    let mut ordinals = HashSet::new();
    if let Some(repeated) = draft.items.iter().find(|item| !ordinals.insert(item.ordinal)) {
        return invalid(format!("item ordinal {} is used more than once", repeated.ordinal));
    }

    let items = draft.item_ids();
    if let Some(missing) = items.iter().find(|item| !membership.contains(**item)) {
        return Err(SyncError::EntityNotFound {
            kind: "item",
            id: missing.get(),
        }
        .into());
    }
    Ok(membership.hosts_of_items(&items))
}

/// Reject drafts whose names clash on their hosts, within the batch or with stored
/// entities other than the drafts themselves.
///
/// `previous` maps updated ids to their stored names so renames are reported as such.
fn check_names<K, S>(
    store: &S,
    drafts: &[EntityDraft<K>],
    hosts: &[BTreeSet<HostId>],
    previous: &HashMap<EntityId, String>,
    links: &LinkGraph,
) -> Result<()>
where
    K: EntityKind,
    S: Store + EntityStore<K>,
{
    let mut seen: HashSet<(&str, HostId)> = HashSet::new();
    for (draft, draft_hosts) in drafts.iter().zip(hosts) {
        for host in draft_hosts {
            if !seen.insert((draft.name.as_str(), *host)) {
                return Err(SyncError::NameCollision {
                    kind: K::LABEL,
                    name: draft.name.clone(),
                    host: links.name(*host),
                    reason: CollisionReason::DuplicateInBatch,
                }
                .into());
            }
        }
    }

    let names: Vec<String> = drafts
        .iter()
        .map(|draft| draft.name.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let all_hosts: Vec<HostId> =
        hosts.iter().flatten().copied().collect::<BTreeSet<_>>().into_iter().collect();
    let own: HashSet<EntityId> = drafts.iter().filter_map(|draft| draft.id).collect();
    let existing: Vec<Entity<K>> = EntityStore::<K>::entities_named(store, &names, &all_hosts)?
        .into_iter()
        .filter(|entity| !own.contains(&entity.id))
        .collect();
    if existing.is_empty() {
        return Ok(());
    }
    let membership = Membership::load(store, existing.iter().flat_map(Entity::item_ids))?;

    for other in &existing {
        let other_hosts = membership.hosts_of(other);
        for (draft, draft_hosts) in drafts.iter().zip(hosts) {
            if draft.name != other.name {
                continue;
            }
            let Some(host) = draft_hosts.intersection(&other_hosts).next() else {
                continue;
            };
            let renamed_from =
                draft.id.and_then(|id| previous.get(&id)).filter(|old| **old != draft.name);
            let error = match renamed_from {
                Some(from) => SyncError::RenameCollision {
                    kind: K::LABEL,
                    from: from.clone(),
                    to: draft.name.clone(),
                    host: links.name(*host),
                },
                None => SyncError::NameCollision {
                    kind: K::LABEL,
                    name: draft.name.clone(),
                    host: links.name(*host),
                    reason: CollisionReason::AlreadyExists,
                },
            };
            return Err(error.into());
        }
    }
    Ok(())
}

fn apply_plan<S: Store>(
    store: &mut S,
    config: &EngineConfig,
    plan: &DependencyPlan,
    report: &mut SyncReport,
) -> Result<()> {
    let size = config.write_batch_size.max(1);
    for chunk in plan.delete.chunks(size) {
        store.delete_edges(chunk)?;
    }
    for chunk in plan.insert.chunks(size) {
        store.insert_edges(chunk)?;
    }
    report.dependencies.deleted += plan.delete.len();
    report.dependencies.inserted += plan.insert.len();
    Ok(())
}

/// Mirror every stored dependency of `triggers` onto their clones.
fn inherit_existing<S: Store>(
    store: &mut S,
    config: &EngineConfig,
    triggers: &[EntityId],
    restrict: Option<&BTreeSet<HostId>>,
    report: &mut SyncReport,
) -> Result<()> {
    let pairs: Vec<Pair> = store
        .edges_by_down(triggers)?
        .into_iter()
        .map(|edge| (edge.trigger_down, edge.trigger_up))
        .collect();
    if pairs.is_empty() {
        return Ok(());
    }
    DependencyInheritor::new(store, config).inherit(&pairs, &[], restrict, &mut report.dependencies)
}

/// Delete `roots`, every clone derived from them at any depth, and their dependency edges.
fn remove_with_clones<K, S>(
    store: &mut S,
    config: &EngineConfig,
    roots: &[Entity<K>],
    report: &mut SyncReport,
) -> Result<()>
where
    K: EntityKind,
    S: Store + EntityStore<K>,
{
    let mut doomed: BTreeMap<EntityId, usize> =
        roots.iter().map(|root| (root.id, root.items.len())).collect();
    let mut frontier: Vec<EntityId> = doomed.keys().copied().collect();
    while !frontier.is_empty() {
        let clones = EntityStore::<K>::clones_of(&*store, &frontier)?;
        frontier = Vec::new();
        for clone in clones {
            if doomed.insert(clone.id, clone.items.len()).is_none() {
                frontier.push(clone.id);
            }
        }
    }

    let ids: Vec<EntityId> = doomed.keys().copied().collect();
    let size = config.write_batch_size.max(1);
    if K::HAS_DEPENDENCIES {
        let edges: Vec<DependencyId> = store
            .edges_by_down(&ids)?
            .into_iter()
            .chain(store.edges_by_up(&ids)?)
            .map(|edge| edge.id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        for chunk in edges.chunks(size) {
            store.delete_edges(chunk)?;
        }
        report.dependencies.deleted += edges.len();
    }
    for chunk in ids.chunks(size) {
        EntityStore::<K>::delete_entities(store, chunk)?;
    }

    tracing::debug!("Deleted {} {} entities including clones", ids.len(), K::LABEL);
    report.deleted += ids.len();
    report.sub_items.deleted += doomed.values().sum::<usize>();
    Ok(())
}
