//! Validation of trigger dependency edges against membership changes.
//!
//! Given a set of trigger changes (new item lists, new dependency lists, or both)
//! the checker runs four passes:
//! 1. compute the hosts each changed trigger loses
//! 2. existing edges touching a trigger that lost hosts must still connect two
//!    triggers whose host scopes overlap
//! 3. newly listed edges must not be self-loops, duplicates, or close a cycle
//! 4. newly listed edges must respect the template scope rules
//!
//! Nothing is written; the result is the set of edge inserts and deletes that the
//! caller applies once the whole request has been validated.

use super::graph::DependencyGraph;
use crate::core::{Result, SyncError};
use crate::inheritance::{LinkGraph, Membership};
use crate::model::{DependencyEdge, DependencyId, Entity, EntityId, HostId, ItemId, Trigger};
use crate::store::{Catalog, DependencyStore, EntityStore};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Proposed change to one trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerChange {
    pub trigger_id: EntityId,
    /// New item list; `None` keeps the stored items.
    #[serde(default)]
    pub items: Option<Vec<ItemId>>,
    /// New full dependency list; `None` keeps the stored dependencies.
    #[serde(default)]
    pub dependencies: Option<Vec<EntityId>>,
}

impl TriggerChange {
    pub const fn items(trigger_id: EntityId, items: Vec<ItemId>) -> Self {
        Self {
            trigger_id,
            items: Some(items),
            dependencies: None,
        }
    }

    pub const fn dependencies(trigger_id: EntityId, dependencies: Vec<EntityId>) -> Self {
        Self {
            trigger_id,
            items: None,
            dependencies: Some(dependencies),
        }
    }
}

/// Validated edge writes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DependencyPlan {
    /// `(trigger_down, trigger_up)` pairs to insert.
    pub insert: Vec<(EntityId, EntityId)>,
    /// Existing edges dropped from an explicit dependency list.
    pub delete: Vec<DependencyId>,
}

impl DependencyPlan {
    pub fn is_empty(&self) -> bool {
        self.insert.is_empty() && self.delete.is_empty()
    }
}

/// Read-only consistency checker over a store.
pub struct DependencyChecker<'s, S: ?Sized> {
    store: &'s S,
}

/// State loaded once per check.
struct Snapshot {
    triggers: HashMap<EntityId, Entity<Trigger>>,
    before: HashMap<EntityId, BTreeSet<HostId>>,
    after: HashMap<EntityId, BTreeSet<HostId>>,
    links: LinkGraph,
}

impl Snapshot {
    fn name(&self, id: EntityId) -> String {
        self.triggers.get(&id).map_or_else(|| id.to_string(), |trigger| trigger.name.clone())
    }

    fn hosts_after(&self, id: EntityId) -> BTreeSet<HostId> {
        self.after.get(&id).cloned().unwrap_or_default()
    }

    fn lost(&self, id: EntityId) -> BTreeSet<HostId> {
        let before = self.before.get(&id).cloned().unwrap_or_default();
        let after = self.hosts_after(id);
        before.difference(&after).copied().collect()
    }
}

impl<'s, S> DependencyChecker<'s, S>
where
    S: Catalog + DependencyStore + EntityStore<Trigger> + ?Sized,
{
    pub const fn new(store: &'s S) -> Self {
        Self {
            store,
        }
    }

    /// Validate `changes` and compute the resulting edge writes.
    pub fn check(&self, changes: &[TriggerChange]) -> Result<DependencyPlan> {
        let mut by_trigger: BTreeMap<EntityId, &TriggerChange> = BTreeMap::new();
        for change in changes {
            if by_trigger.insert(change.trigger_id, change).is_some() {
                let name = EntityStore::<Trigger>::entities(self.store, &[change.trigger_id])?
                    .into_iter()
                    .next()
                    .map_or_else(|| change.trigger_id.to_string(), |trigger| trigger.name);
                return Err(SyncError::InvalidEntity {
                    kind: "trigger",
                    name,
                    reason: "listed more than once in the request".to_string(),
                }
                .into());
            }
        }
        let changes = by_trigger;
        let changed: Vec<EntityId> = changes.keys().copied().collect();
        if changed.is_empty() {
            return Ok(DependencyPlan::default());
        }

        let down_edges = self.store.edges_by_down(&changed)?;
        let up_edges = self.store.edges_by_up(&changed)?;
        let snapshot = self.snapshot(&changes, &down_edges, &up_edges)?;
        let mut plan = DependencyPlan::default();

        // existing edges that survive the change, by id
        let mut retained: BTreeMap<DependencyId, DependencyEdge> = BTreeMap::new();
        for edge in &down_edges {
            let listed = changes
                .get(&edge.trigger_down)
                .and_then(|change| change.dependencies.as_ref());
            match listed {
                Some(list) if !list.contains(&edge.trigger_up) => plan.delete.push(edge.id),
                _ => {
                    retained.insert(edge.id, *edge);
                }
            }
        }
        for edge in &up_edges {
            if !plan.delete.contains(&edge.id) {
                retained.insert(edge.id, *edge);
            }
        }

        self.check_affected_edges(&snapshot, retained.values())?;

        let existing: HashSet<(EntityId, EntityId)> =
            retained.values().map(|edge| (edge.trigger_down, edge.trigger_up)).collect();
        let new_edges = Self::collect_new_edges(&snapshot, &changes, &existing)?;
        if new_edges.is_empty() {
            return Ok(plan);
        }

        self.check_cycles(&snapshot, &new_edges, &plan.delete)?;
        for (down, up) in &new_edges {
            check_scope(&snapshot, *down, *up)?;
        }

        plan.insert = new_edges;
        tracing::debug!(
            "Dependency plan: {} inserts, {} deletes",
            plan.insert.len(),
            plan.delete.len()
        );
        Ok(plan)
    }

    fn snapshot(
        &self,
        changes: &BTreeMap<EntityId, &TriggerChange>,
        down_edges: &[DependencyEdge],
        up_edges: &[DependencyEdge],
    ) -> Result<Snapshot> {
        let mut ids: BTreeSet<EntityId> = changes.keys().copied().collect();
        for change in changes.values() {
            ids.extend(change.dependencies.iter().flatten().copied());
        }
        ids.extend(down_edges.iter().map(|edge| edge.trigger_up));
        ids.extend(up_edges.iter().map(|edge| edge.trigger_down));
        let ids: Vec<EntityId> = ids.into_iter().collect();

        let triggers: HashMap<EntityId, Entity<Trigger>> =
            EntityStore::<Trigger>::entities(self.store, &ids)?
                .into_iter()
                .map(|trigger| (trigger.id, trigger))
                .collect();
        for change in changes.values() {
            let referenced = std::iter::once(&change.trigger_id)
                .chain(change.dependencies.iter().flatten());
            for id in referenced {
                if !triggers.contains_key(id) {
                    return Err(SyncError::EntityNotFound {
                        kind: "trigger",
                        id: id.get(),
                    }
                    .into());
                }
            }
        }

        let items = triggers
            .values()
            .flat_map(Entity::item_ids)
            .chain(changes.values().flat_map(|change| change.items.iter().flatten().copied()));
        let membership = Membership::load(self.store, items)?;
        for change in changes.values() {
            if let Some(missing) =
                change.items.iter().flatten().find(|item| !membership.contains(**item))
            {
                return Err(SyncError::EntityNotFound {
                    kind: "item",
                    id: missing.get(),
                }
                .into());
            }
        }

        let before: HashMap<EntityId, BTreeSet<HostId>> =
            triggers.values().map(|trigger| (trigger.id, membership.hosts_of(trigger))).collect();
        let mut after = before.clone();
        for change in changes.values() {
            if let Some(items) = &change.items {
                after.insert(change.trigger_id, membership.hosts_of_items(items));
            }
        }

        let involved: BTreeSet<HostId> =
            before.values().chain(after.values()).flatten().copied().collect();
        let links = LinkGraph::load(self.store, involved)?;

        Ok(Snapshot {
            triggers,
            before,
            after,
            links,
        })
    }

    /// Existing edges with an endpoint that lost hosts must keep a shared scope.
    fn check_affected_edges<'e>(
        &self,
        snapshot: &Snapshot,
        edges: impl Iterator<Item = &'e DependencyEdge>,
    ) -> Result<()> {
        for edge in edges {
            let lost_down = snapshot.lost(edge.trigger_down);
            let lost_up = snapshot.lost(edge.trigger_up);
            if lost_down.is_empty() && lost_up.is_empty() {
                continue;
            }

            let down_scope = snapshot.links.scope(&snapshot.hosts_after(edge.trigger_down));
            let up_scope = snapshot.links.scope(&snapshot.hosts_after(edge.trigger_up));
            if down_scope.is_disjoint(&up_scope) {
                return Err(SyncError::DependencyUnsatisfiable {
                    trigger: snapshot.name(edge.trigger_down),
                    trigger_up: snapshot.name(edge.trigger_up),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Listed dependencies that do not exist yet, after rejecting self-loops and repeats.
    fn collect_new_edges(
        snapshot: &Snapshot,
        changes: &BTreeMap<EntityId, &TriggerChange>,
        existing: &HashSet<(EntityId, EntityId)>,
    ) -> Result<Vec<(EntityId, EntityId)>> {
        let mut new_edges = Vec::new();
        for (down, change) in changes {
            let Some(list) = &change.dependencies else {
                continue;
            };
            let mut seen = HashSet::new();
            for up in list {
                if !seen.insert(*up) {
                    return Err(SyncError::DuplicateDependency {
                        trigger: snapshot.name(*down),
                        trigger_up: snapshot.name(*up),
                    }
                    .into());
                }
                if up == down {
                    let name = snapshot.name(*down);
                    return Err(SyncError::DependencyCycle {
                        trigger: name.clone(),
                        trigger_up: name.clone(),
                        chain: format!("{name} -> {name}"),
                    }
                    .into());
                }
                if !existing.contains(&(*down, *up)) {
                    new_edges.push((*down, *up));
                }
            }
        }
        Ok(new_edges)
    }

    /// Reject new edges that close a cycle, considering the whole batch together.
    fn check_cycles(
        &self,
        snapshot: &Snapshot,
        new_edges: &[(EntityId, EntityId)],
        deleted: &[DependencyId],
    ) -> Result<()> {
        let seeds: Vec<EntityId> =
            new_edges.iter().flat_map(|(down, up)| [*down, *up]).collect();
        let skip: HashSet<DependencyId> = deleted.iter().copied().collect();
        let mut graph = DependencyGraph::load(self.store, &seeds, &skip)?;

        for (down, up) in new_edges {
            if let Some(path) = graph.path(*up, *down) {
                let chain = std::iter::once(*down)
                    .chain(path)
                    .map(|id| snapshot.name(id))
                    .collect::<Vec<_>>()
                    .join(" -> ");
                return Err(SyncError::DependencyCycle {
                    trigger: snapshot.name(*down),
                    trigger_up: snapshot.name(*up),
                    chain,
                }
                .into());
            }
            graph.add_dependency(*down, *up);
        }
        Ok(())
    }
}

/// Template scope rules for a new edge where `down` depends on `up`.
///
/// - a trigger that lives only on hosts may not depend on a template trigger
/// - triggers of one template may depend on each other freely
/// - a template trigger may not depend on a trigger of a parent template, nor on a
///   trigger of a template or host that inherits its own template
/// - when `up` lives on other templates, every host linked to the template of
///   `down` must also be linked to one of them
fn check_scope(snapshot: &Snapshot, down: EntityId, up: EntityId) -> Result<()> {
    let links = &snapshot.links;
    let down_hosts = snapshot.hosts_after(down);
    let up_hosts = snapshot.hosts_after(up);
    let down_templates: BTreeSet<HostId> =
        down_hosts.iter().copied().filter(|host| links.is_template(*host)).collect();
    let up_templates: BTreeSet<HostId> =
        up_hosts.iter().copied().filter(|host| links.is_template(*host)).collect();

    let violation = |reason: String| -> Result<()> {
        Err(SyncError::DependencyScopeViolation {
            trigger: snapshot.name(down),
            trigger_up: snapshot.name(up),
            reason,
        }
        .into())
    };

    if down_templates.is_empty() {
        if !up_templates.is_empty() {
            return violation("a host trigger cannot depend on a template trigger".to_string());
        }
        return Ok(());
    }

    if !down_templates.is_disjoint(&up_templates) {
        return Ok(());
    }

    if up_templates
        .iter()
        .any(|up_host| down_templates.iter().any(|template| links.is_ancestor(*up_host, *template)))
    {
        return violation("the trigger depended upon belongs to a parent template".to_string());
    }

    if up_hosts
        .iter()
        .any(|up_host| down_templates.iter().any(|template| links.is_ancestor(*template, *up_host)))
    {
        return violation(
            "the trigger depended upon belongs to a child template or host".to_string(),
        );
    }

    if !up_templates.is_empty() {
        for template in &down_templates {
            for host in links.children(*template) {
                if links.parents(host).is_disjoint(&up_templates) {
                    return violation(format!(
                        "\"{}\" is linked to \"{}\" but not to the template of the trigger depended upon",
                        links.name(host),
                        links.name(*template)
                    ));
                }
            }
        }
    }

    Ok(())
}
