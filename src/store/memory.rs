//! In-memory store persisted as a JSON state file.
//!
//! Transactions snapshot the whole store and restore it when the closure fails.
//! Every write is counted per table in a [`WriteLog`] so callers can assert that a
//! repeated propagation is a no-op.
//!
//! ```rust,no_run
//! use tplsync::store::MemoryStore;
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! let store = MemoryStore::load(Path::new("state.json"))?;
//! println!("{} writes so far", store.writes().total());
//! # Ok(())
//! # }
//! ```

use super::{Catalog, DependencyStore, EntityStore, ItemInheritance, Transactional};
use crate::core::{Result, SyncError};
use crate::dependency::DependencyGraph;
use crate::model::{
    DependencyEdge, DependencyId, Entity, EntityId, EntityKind, Graph, Host, HostId, Item, ItemId,
    ItemLink, NewEntity, RowKey, SubItemId, TemplateLink, Trigger,
};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::path::Path;

const ITEMS_TABLE: &str = "items";
const DEPENDENCY_TABLE: &str = "trigger_depends";

/// Row addressable by a primary key.
pub trait Keyed {
    type Key: Ord + Copy + fmt::Debug;

    fn key(&self) -> Self::Key;
}

impl Keyed for Host {
    type Key = HostId;

    fn key(&self) -> HostId {
        self.id
    }
}

impl Keyed for Item {
    type Key = ItemId;

    fn key(&self) -> ItemId {
        self.id
    }
}

impl<K: EntityKind> Keyed for Entity<K> {
    type Key = EntityId;

    fn key(&self) -> EntityId {
        self.id
    }
}

impl Keyed for DependencyEdge {
    type Key = DependencyId;

    fn key(&self) -> DependencyId {
        self.id
    }
}

/// Rows keyed by id, serialized as a plain list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    from = "Vec<T>",
    into = "Vec<T>",
    bound(serialize = "T: Serialize + Clone", deserialize = "T: Deserialize<'de>")
)]
pub struct Table<T: Keyed> {
    rows: BTreeMap<T::Key, T>,
}

impl<T: Keyed> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
        }
    }
}

impl<T: Keyed> From<Vec<T>> for Table<T> {
    fn from(rows: Vec<T>) -> Self {
        Self {
            rows: rows.into_iter().map(|row| (row.key(), row)).collect(),
        }
    }
}

impl<T: Keyed> From<Table<T>> for Vec<T> {
    fn from(table: Table<T>) -> Self {
        table.rows.into_values().collect()
    }
}

impl<T: Keyed> Table<T> {
    fn get(&self, key: T::Key) -> Option<&T> {
        self.rows.get(&key)
    }

    fn values(&self) -> impl Iterator<Item = &T> {
        self.rows.values()
    }

    fn insert(&mut self, row: T) {
        self.rows.insert(row.key(), row);
    }

    fn remove(&mut self, key: T::Key) -> Option<T> {
        self.rows.remove(&key)
    }

    fn last_key(&self) -> Option<T::Key> {
        self.rows.keys().next_back().copied()
    }
}

/// Gives generic code access to the table of one entity kind.
pub trait KindTable<K: EntityKind> {
    fn table(&self) -> &Table<Entity<K>>;
    fn table_mut(&mut self) -> &mut Table<Entity<K>>;
}

impl KindTable<Graph> for MemoryStore {
    fn table(&self) -> &Table<Entity<Graph>> {
        &self.graphs
    }

    fn table_mut(&mut self) -> &mut Table<Entity<Graph>> {
        &mut self.graphs
    }
}

impl KindTable<Trigger> for MemoryStore {
    fn table(&self) -> &Table<Entity<Trigger>> {
        &self.triggers
    }

    fn table_mut(&mut self) -> &mut Table<Entity<Trigger>> {
        &mut self.triggers
    }
}

/// Row counts written per table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriteLog {
    pub inserted: BTreeMap<String, usize>,
    pub updated: BTreeMap<String, usize>,
    pub deleted: BTreeMap<String, usize>,
}

impl WriteLog {
    /// Total rows written across all tables.
    #[must_use]
    pub fn total(&self) -> usize {
        self.inserted.values().chain(self.updated.values()).chain(self.deleted.values()).sum()
    }

    #[must_use]
    pub fn inserted(&self, table: &str) -> usize {
        self.inserted.get(table).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn updated(&self, table: &str) -> usize {
        self.updated.get(table).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn deleted(&self, table: &str) -> usize {
        self.deleted.get(table).copied().unwrap_or(0)
    }

    fn record(map: &mut BTreeMap<String, usize>, table: &str, rows: usize) {
        if rows > 0 {
            *map.entry(table.to_string()).or_insert(0) += rows;
        }
    }
}

/// In-memory implementation of every store trait.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStore {
    #[serde(default)]
    hosts: Table<Host>,
    #[serde(default)]
    template_links: BTreeSet<TemplateLink>,
    #[serde(default)]
    items: Table<Item>,
    #[serde(default)]
    graphs: Table<Entity<Graph>>,
    #[serde(default)]
    triggers: Table<Entity<Trigger>>,
    #[serde(default)]
    dependencies: Table<DependencyEdge>,
    /// Let the item-inheritance collaborator create missing item links on demand.
    #[serde(default)]
    auto_link_items: bool,
    #[serde(default)]
    sequences: BTreeMap<String, u64>,
    #[serde(skip)]
    writes: WriteLog,
    #[serde(skip)]
    failing_table: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON state file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;
        let store: Self = serde_json::from_str(&content)
            .map_err(SyncError::from)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;
        store
            .validate_dependencies()
            .with_context(|| format!("Invalid state file: {}", path.display()))?;
        tracing::debug!(
            "Loaded state with {} hosts, {} items, {} graphs, {} triggers",
            store.hosts.rows.len(),
            store.items.rows.len(),
            store.graphs.rows.len(),
            store.triggers.rows.len()
        );
        Ok(store)
    }

    /// Reject dependency edges that already form a cycle.
    fn validate_dependencies(&self) -> Result<()> {
        let mut graph = DependencyGraph::new();
        for edge in self.dependencies.values() {
            graph.add_dependency(edge.trigger_down, edge.trigger_up);
        }
        let Some(cycle) = graph.detect_cycle() else {
            return Ok(());
        };
        let chain = cycle
            .iter()
            .map(|id| self.triggers.get(*id).map_or_else(|| id.to_string(), |t| t.name.clone()))
            .collect::<Vec<_>>()
            .join(" -> ");
        Err(SyncError::Store {
            operation: "load dependencies".to_string(),
            reason: format!("dependency edges form a cycle: {chain}"),
        }
        .into())
    }

    /// Write the state as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).map_err(SyncError::from)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write state file: {}", path.display()))?;
        Ok(())
    }

    /// Writes recorded since the store was created or last drained.
    pub const fn writes(&self) -> &WriteLog {
        &self.writes
    }

    /// Drain the write log.
    pub fn take_writes(&mut self) -> WriteLog {
        std::mem::take(&mut self.writes)
    }

    pub fn set_auto_link_items(&mut self, enabled: bool) {
        self.auto_link_items = enabled;
    }

    /// Make every subsequent write to `table` fail with a store error.
    pub fn fail_writes_to(&mut self, table: &str) {
        self.failing_table = Some(table.to_string());
    }

    pub fn upsert_host(&mut self, host: Host) {
        self.hosts.insert(host);
    }

    pub fn host(&self, id: HostId) -> Option<&Host> {
        self.hosts.get(id)
    }

    pub fn host_by_name(&self, name: &str) -> Option<&Host> {
        self.hosts.values().find(|host| host.name == name)
    }

    pub fn upsert_item(&mut self, item: Item) {
        self.items.insert(item);
    }

    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.get(id)
    }

    pub fn items_on(&self, host: HostId) -> Vec<&Item> {
        self.items.values().filter(|item| item.host_id == host).collect()
    }

    /// Allocate a fresh item id.
    pub fn next_item_id(&mut self) -> ItemId {
        let floor = self.items.last_key().map_or(0, ItemId::get);
        ItemId(self.next_id(ITEMS_TABLE, floor))
    }

    /// Record that `host` inherits `template`.
    ///
    /// # Errors
    ///
    /// Fails when either host is unknown, `template` is not a template, or the
    /// link would make the template graph cyclic.
    pub fn link_template(&mut self, template: HostId, host: HostId) -> Result<()> {
        let template_row = self.hosts.get(template).ok_or(SyncError::EntityNotFound {
            kind: "host",
            id: template.get(),
        })?;
        if !template_row.is_template() {
            return Err(SyncError::Store {
                operation: "link template".to_string(),
                reason: format!("host \"{}\" is not a template", template_row.name),
            }
            .into());
        }
        if self.hosts.get(host).is_none() {
            return Err(SyncError::EntityNotFound {
                kind: "host",
                id: host.get(),
            }
            .into());
        }
        if template == host || self.inherits(template, host) {
            return Err(SyncError::Store {
                operation: "link template".to_string(),
                reason: "circular template linkage".to_string(),
            }
            .into());
        }
        self.template_links.insert(TemplateLink {
            template_id: template,
            host_id: host,
        });
        Ok(())
    }

    /// Remove a template link. Entities and items are left alone.
    pub fn unlink_template(&mut self, template: HostId, host: HostId) -> bool {
        self.template_links.remove(&TemplateLink {
            template_id: template,
            host_id: host,
        })
    }

    /// Copy the items of `template` to `host` as item links, cascading to every host
    /// below `host`.
    pub fn inherit_template_items(&mut self, template: HostId, host: HostId) -> Result<usize> {
        let template_items: Vec<Item> =
            self.items.values().filter(|item| item.host_id == template).cloned().collect();
        let mut created = 0;
        for item in &template_items {
            if self.link_item(item, host)? {
                created += 1;
            }
        }
        let below: Vec<HostId> = self
            .template_links
            .iter()
            .filter(|link| link.template_id == host)
            .map(|link| link.host_id)
            .collect();
        for child in below {
            created += self.inherit_template_items(host, child)?;
        }
        Ok(created)
    }

    /// Store an entity with a caller-chosen id, bypassing the engine.
    pub fn put_entity<K: EntityKind>(&mut self, entity: Entity<K>)
    where
        Self: KindTable<K>,
    {
        KindTable::<K>::table_mut(self).insert(entity);
    }

    pub fn entity<K: EntityKind>(&self, id: EntityId) -> Option<&Entity<K>>
    where
        Self: KindTable<K>,
    {
        KindTable::<K>::table(self).get(id)
    }

    pub fn all_entities<K: EntityKind>(&self) -> Vec<&Entity<K>>
    where
        Self: KindTable<K>,
    {
        KindTable::<K>::table(self).values().collect()
    }

    /// The entity named `name` whose items live on `host`.
    pub fn entity_on<K: EntityKind>(&self, host: HostId, name: &str) -> Option<&Entity<K>>
    where
        Self: KindTable<K>,
    {
        KindTable::<K>::table(self)
            .values()
            .find(|entity| entity.name == name && self.entity_hosts(entity).contains(&host))
    }

    /// Authored entities whose items all live on templates.
    pub fn template_roots<K: EntityKind>(&self) -> Vec<EntityId>
    where
        Self: KindTable<K>,
    {
        KindTable::<K>::table(self)
            .values()
            .filter(|entity| !entity.is_clone())
            .filter(|entity| {
                let hosts = self.entity_hosts(*entity);
                !hosts.is_empty()
                    && hosts.iter().all(|id| self.hosts.get(*id).is_some_and(Host::is_template))
            })
            .map(|entity| entity.id)
            .collect()
    }

    /// Store a dependency edge, bypassing validation.
    pub fn put_dependency(&mut self, trigger_down: EntityId, trigger_up: EntityId) -> DependencyId {
        let floor = self.dependencies.last_key().map_or(0, DependencyId::get);
        let id = DependencyId(self.next_id(DEPENDENCY_TABLE, floor));
        self.dependencies.insert(DependencyEdge {
            id,
            trigger_down,
            trigger_up,
        });
        id
    }

    pub fn dependency_edges(&self) -> Vec<DependencyEdge> {
        self.dependencies.values().copied().collect()
    }

    fn inherits(&self, host: HostId, ancestor: HostId) -> bool {
        let mut stack = vec![host];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            for link in self.template_links.iter().filter(|link| link.host_id == current) {
                if link.template_id == ancestor {
                    return true;
                }
                stack.push(link.template_id);
            }
        }
        false
    }

    /// Create or adopt the counterpart of `template_item` on `host`.
    /// Returns `false` when the link already exists or cannot be made.
    fn link_item(&mut self, template_item: &Item, host: HostId) -> Result<bool> {
        let existing = self
            .items
            .values()
            .filter(|item| item.host_id == host)
            .find(|item| {
                item.origin_id == Some(template_item.id)
                    || (item.key == template_item.key && item.origin_id.is_none())
            })
            .cloned();

        match existing {
            Some(item) if item.origin_id == Some(template_item.id) => Ok(false),
            Some(mut item) => {
                self.check_writable(ITEMS_TABLE)?;
                item.origin_id = Some(template_item.id);
                self.items.insert(item);
                WriteLog::record(&mut self.writes.updated, ITEMS_TABLE, 1);
                Ok(true)
            }
            None => {
                if self.items.values().any(|item| item.host_id == host && item.key == template_item.key)
                {
                    return Ok(false);
                }
                self.check_writable(ITEMS_TABLE)?;
                let id = self.next_item_id();
                self.items.insert(Item {
                    id,
                    host_id: host,
                    key: template_item.key.clone(),
                    origin_id: Some(template_item.id),
                });
                WriteLog::record(&mut self.writes.inserted, ITEMS_TABLE, 1);
                Ok(true)
            }
        }
    }

    fn entity_hosts<K: EntityKind>(&self, entity: &Entity<K>) -> BTreeSet<HostId> {
        entity
            .item_ids()
            .into_iter()
            .filter_map(|id| self.items.get(id).map(|item| item.host_id))
            .collect()
    }

    fn next_id(&mut self, sequence: &str, floor: u64) -> u64 {
        let counter = self.sequences.entry(sequence.to_string()).or_insert(0);
        *counter = (*counter).max(floor) + 1;
        *counter
    }

    fn check_writable(&self, table: &str) -> Result<()> {
        if self.failing_table.as_deref() == Some(table) {
            return Err(SyncError::Store {
                operation: format!("write to {table}"),
                reason: "injected failure".to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn check_items_exist<K: EntityKind>(&self, name: &str, entity_items: &[ItemId]) -> Result<()> {
        if let Some(missing) = entity_items.iter().find(|id| self.items.get(**id).is_none()) {
            return Err(SyncError::Store {
                operation: format!("write {} \"{name}\"", K::LABEL),
                reason: format!("item {missing} does not exist"),
            }
            .into());
        }
        Ok(())
    }

    fn max_sub_item_id<K: EntityKind>(&self) -> u64
    where
        Self: KindTable<K>,
    {
        KindTable::<K>::table(self)
            .values()
            .flat_map(|entity| entity.items.iter().filter_map(|item| item.id))
            .map(SubItemId::get)
            .max()
            .unwrap_or(0)
    }
}

impl Catalog for MemoryStore {
    fn hosts(&self, ids: &[HostId]) -> Result<Vec<Host>> {
        Ok(ids.iter().filter_map(|id| self.hosts.get(*id).cloned()).collect())
    }

    fn template_links(&self) -> Result<Vec<TemplateLink>> {
        Ok(self.template_links.iter().copied().collect())
    }

    fn items(&self, ids: &[ItemId]) -> Result<Vec<Item>> {
        Ok(ids.iter().filter_map(|id| self.items.get(*id).cloned()).collect())
    }

    fn item_links(&self, template_items: &[ItemId], hosts: &[HostId]) -> Result<Vec<ItemLink>> {
        let template_items: HashSet<ItemId> = template_items.iter().copied().collect();
        let hosts: HashSet<HostId> = hosts.iter().copied().collect();
        Ok(self
            .items
            .values()
            .filter(|item| hosts.contains(&item.host_id))
            .filter_map(|item| {
                item.origin_id.filter(|origin| template_items.contains(origin)).map(|origin| {
                    ItemLink {
                        template_item_id: origin,
                        host_id: item.host_id,
                        item_id: item.id,
                    }
                })
            })
            .collect())
    }
}

impl ItemInheritance for MemoryStore {
    fn inherit_items(&mut self, template_items: &[ItemId], hosts: &[HostId]) -> Result<usize> {
        if !self.auto_link_items {
            return Ok(0);
        }
        let mut created = 0;
        for template_item in template_items {
            let Some(item) = self.items.get(*template_item).cloned() else {
                continue;
            };
            for host in hosts {
                let link = TemplateLink {
                    template_id: item.host_id,
                    host_id: *host,
                };
                if self.template_links.contains(&link) && self.link_item(&item, *host)? {
                    created += 1;
                }
            }
        }
        tracing::debug!("Item inheritance created {created} item links");
        Ok(created)
    }
}

impl<K: EntityKind> EntityStore<K> for MemoryStore
where
    MemoryStore: KindTable<K>,
{
    fn entities(&self, ids: &[EntityId]) -> Result<Vec<Entity<K>>> {
        let table = KindTable::<K>::table(self);
        Ok(ids.iter().filter_map(|id| table.get(*id).cloned()).collect())
    }

    fn entities_on_hosts(&self, hosts: &[HostId]) -> Result<Vec<Entity<K>>> {
        let hosts: HashSet<HostId> = hosts.iter().copied().collect();
        Ok(KindTable::<K>::table(self)
            .values()
            .filter(|entity| self.entity_hosts(*entity).iter().any(|host| hosts.contains(host)))
            .cloned()
            .collect())
    }

    fn entities_named(&self, names: &[String], hosts: &[HostId]) -> Result<Vec<Entity<K>>> {
        let names: HashSet<&str> = names.iter().map(String::as_str).collect();
        let hosts: HashSet<HostId> = hosts.iter().copied().collect();
        Ok(KindTable::<K>::table(self)
            .values()
            .filter(|entity| names.contains(entity.name.as_str()))
            .filter(|entity| self.entity_hosts(*entity).iter().any(|host| hosts.contains(host)))
            .cloned()
            .collect())
    }

    fn clones_of(&self, origins: &[EntityId]) -> Result<Vec<Entity<K>>> {
        let origins: HashSet<EntityId> = origins.iter().copied().collect();
        Ok(KindTable::<K>::table(self)
            .values()
            .filter(|entity| entity.origin_id.is_some_and(|origin| origins.contains(&origin)))
            .cloned()
            .collect())
    }

    fn insert_entities(
        &mut self,
        rows: Vec<(RowKey, NewEntity<K>)>,
    ) -> Result<Vec<(RowKey, EntityId)>> {
        self.check_writable(K::TABLE)?;
        let mut sub_item_floor = self.max_sub_item_id::<K>();
        let mut assigned = Vec::with_capacity(rows.len());
        let mut sub_items = 0;

        for (key, mut row) in rows {
            let item_ids: Vec<ItemId> = row
                .items
                .iter()
                .map(|item| item.item_id)
                .chain(K::header_items(&row.header))
                .collect();
            self.check_items_exist::<K>(&row.name, &item_ids)?;

            let floor = KindTable::<K>::table(self).last_key().map_or(0, EntityId::get);
            let id = EntityId(self.next_id(K::TABLE, floor));
            for item in &mut row.items {
                let sub_id = self.next_id(K::ITEM_TABLE, sub_item_floor);
                sub_item_floor = sub_id;
                item.id = Some(SubItemId(sub_id));
                sub_items += 1;
            }
            KindTable::<K>::table_mut(self).insert(row.into_entity(id));
            assigned.push((key, id));
        }

        WriteLog::record(&mut self.writes.inserted, K::TABLE, assigned.len());
        WriteLog::record(&mut self.writes.inserted, K::ITEM_TABLE, sub_items);
        Ok(assigned)
    }

    fn update_entities(&mut self, rows: Vec<Entity<K>>) -> Result<()> {
        self.check_writable(K::TABLE)?;
        let mut sub_item_floor = self.max_sub_item_id::<K>();
        let (mut inserted, mut updated, mut deleted) = (0, 0, 0);
        let rows_len = rows.len();

        for mut row in rows {
            let existing = KindTable::<K>::table(self).get(row.id).cloned().ok_or_else(|| {
                SyncError::Store {
                    operation: format!("update {}", K::TABLE),
                    reason: format!("{} {} does not exist", K::LABEL, row.id),
                }
            })?;
            self.check_items_exist::<K>(&row.name, &row.item_ids())?;

            let previous: BTreeMap<SubItemId, _> = existing
                .items
                .iter()
                .filter_map(|item| item.id.map(|id| (id, item)))
                .collect();
            let mut kept = HashSet::new();
            for item in &mut row.items {
                match item.id {
                    Some(id) => {
                        let old = previous.get(&id).ok_or_else(|| SyncError::Store {
                            operation: format!("update {}", K::ITEM_TABLE),
                            reason: format!("row {id} does not belong to {} {}", K::LABEL, row.id),
                        })?;
                        if *old != &*item {
                            updated += 1;
                        }
                        kept.insert(id);
                    }
                    None => {
                        let sub_id = self.next_id(K::ITEM_TABLE, sub_item_floor);
                        sub_item_floor = sub_id;
                        item.id = Some(SubItemId(sub_id));
                        inserted += 1;
                    }
                }
            }
            deleted += previous.keys().filter(|id| !kept.contains(*id)).count();
            KindTable::<K>::table_mut(self).insert(row);
        }

        WriteLog::record(&mut self.writes.updated, K::TABLE, rows_len);
        WriteLog::record(&mut self.writes.inserted, K::ITEM_TABLE, inserted);
        WriteLog::record(&mut self.writes.updated, K::ITEM_TABLE, updated);
        WriteLog::record(&mut self.writes.deleted, K::ITEM_TABLE, deleted);
        Ok(())
    }

    fn delete_entities(&mut self, ids: &[EntityId]) -> Result<()> {
        self.check_writable(K::TABLE)?;
        let mut removed = 0;
        let mut sub_items = 0;
        for id in ids {
            if let Some(entity) = KindTable::<K>::table_mut(self).remove(*id) {
                removed += 1;
                sub_items += entity.items.len();
            }
        }

        if K::HAS_DEPENDENCIES {
            let doomed: HashSet<EntityId> = ids.iter().copied().collect();
            let edges: Vec<DependencyId> = self
                .dependencies
                .values()
                .filter(|edge| doomed.contains(&edge.trigger_down) || doomed.contains(&edge.trigger_up))
                .map(|edge| edge.id)
                .collect();
            for edge in &edges {
                self.dependencies.remove(*edge);
            }
            WriteLog::record(&mut self.writes.deleted, DEPENDENCY_TABLE, edges.len());
        }

        WriteLog::record(&mut self.writes.deleted, K::TABLE, removed);
        WriteLog::record(&mut self.writes.deleted, K::ITEM_TABLE, sub_items);
        Ok(())
    }
}

impl DependencyStore for MemoryStore {
    fn edges_by_down(&self, triggers: &[EntityId]) -> Result<Vec<DependencyEdge>> {
        let triggers: HashSet<EntityId> = triggers.iter().copied().collect();
        Ok(self
            .dependencies
            .values()
            .filter(|edge| triggers.contains(&edge.trigger_down))
            .copied()
            .collect())
    }

    fn edges_by_up(&self, triggers: &[EntityId]) -> Result<Vec<DependencyEdge>> {
        let triggers: HashSet<EntityId> = triggers.iter().copied().collect();
        Ok(self
            .dependencies
            .values()
            .filter(|edge| triggers.contains(&edge.trigger_up))
            .copied()
            .collect())
    }

    fn insert_edges(&mut self, edges: &[(EntityId, EntityId)]) -> Result<Vec<DependencyId>> {
        self.check_writable(DEPENDENCY_TABLE)?;
        let mut ids = Vec::with_capacity(edges.len());
        for (down, up) in edges {
            for trigger in [down, up] {
                if self.triggers.get(*trigger).is_none() {
                    return Err(SyncError::Store {
                        operation: format!("insert {DEPENDENCY_TABLE}"),
                        reason: format!("trigger {trigger} does not exist"),
                    }
                    .into());
                }
            }
            if self
                .dependencies
                .values()
                .any(|edge| edge.trigger_down == *down && edge.trigger_up == *up)
            {
                return Err(SyncError::Store {
                    operation: format!("insert {DEPENDENCY_TABLE}"),
                    reason: format!("dependency {down} -> {up} already exists"),
                }
                .into());
            }
            ids.push(self.put_dependency(*down, *up));
        }
        WriteLog::record(&mut self.writes.inserted, DEPENDENCY_TABLE, ids.len());
        Ok(ids)
    }

    fn delete_edges(&mut self, ids: &[DependencyId]) -> Result<()> {
        self.check_writable(DEPENDENCY_TABLE)?;
        let removed = ids.iter().filter(|id| self.dependencies.remove(**id).is_some()).count();
        WriteLog::record(&mut self.writes.deleted, DEPENDENCY_TABLE, removed);
        Ok(())
    }
}

impl Transactional for MemoryStore {
    fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let snapshot = self.clone();
        match f(self) {
            Ok(value) => Ok(value),
            Err(error) => {
                tracing::debug!("Rolling back transaction: {error}");
                *self = snapshot;
                Err(error)
            }
        }
    }
}
