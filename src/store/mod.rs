//! Storage collaborator interfaces.
//!
//! The engine never talks to a database directly. It reads the catalog (hosts,
//! template links, items and item links), reads and writes entities per kind
//! through [`EntityStore`], maintains the trigger dependency relation through
//! [`DependencyStore`], and wraps every operation in [`Transactional::transaction`].
//!
//! Reads take id slices and return every matching row in one call, so an
//! implementation backed by SQL issues one query per call rather than one per row.
//!
//! [`MemoryStore`] is the in-process implementation used by the CLI and the tests.

pub mod memory;

pub use memory::{MemoryStore, WriteLog};

use crate::core::Result;
use crate::model::{
    DependencyEdge, DependencyId, Entity, EntityId, EntityKind, Graph, Host, HostId, Item, ItemId,
    ItemLink, NewEntity, RowKey, TemplateLink, Trigger,
};

/// Read access to hosts, template links, and items.
pub trait Catalog {
    /// Hosts with the given ids. Unknown ids are skipped.
    fn hosts(&self, ids: &[HostId]) -> Result<Vec<Host>>;

    /// Every template link.
    fn template_links(&self) -> Result<Vec<TemplateLink>>;

    /// Items with the given ids. Unknown ids are skipped.
    fn items(&self, ids: &[ItemId]) -> Result<Vec<Item>>;

    /// Item links from any of `template_items` onto any of `hosts`.
    fn item_links(&self, template_items: &[ItemId], hosts: &[HostId]) -> Result<Vec<ItemLink>>;
}

/// The item-inheritance collaborator.
///
/// Asked to create missing item links before the engine gives up on a host.
pub trait ItemInheritance {
    /// Create links for `template_items` on those `hosts` that inherit their template.
    /// Returns the number of links created.
    fn inherit_items(&mut self, template_items: &[ItemId], hosts: &[HostId]) -> Result<usize>;
}

/// Persistence of one entity kind.
pub trait EntityStore<K: EntityKind> {
    /// Entities with the given ids. Unknown ids are skipped.
    fn entities(&self, ids: &[EntityId]) -> Result<Vec<Entity<K>>>;

    /// Entities referencing at least one item owned by any of `hosts`.
    fn entities_on_hosts(&self, hosts: &[HostId]) -> Result<Vec<Entity<K>>>;

    /// Entities named any of `names` on any of `hosts`, in one aggregate lookup.
    fn entities_named(&self, names: &[String], hosts: &[HostId]) -> Result<Vec<Entity<K>>>;

    /// Direct clones of the given entities.
    fn clones_of(&self, origins: &[EntityId]) -> Result<Vec<Entity<K>>>;

    /// Insert rows in one batch, returning the id assigned to each row key.
    fn insert_entities(&mut self, rows: Vec<(RowKey, NewEntity<K>)>) -> Result<Vec<(RowKey, EntityId)>>;

    /// Replace stored entities in one batch.
    ///
    /// Sub-items carrying an id are updated in place, sub-items without one are
    /// inserted, and stored sub-items not listed are deleted.
    fn update_entities(&mut self, rows: Vec<Entity<K>>) -> Result<()>;

    /// Delete entities and their sub-items.
    fn delete_entities(&mut self, ids: &[EntityId]) -> Result<()>;
}

/// Persistence of the trigger dependency relation.
pub trait DependencyStore {
    /// Edges whose dependent trigger is in `triggers`.
    fn edges_by_down(&self, triggers: &[EntityId]) -> Result<Vec<DependencyEdge>>;

    /// Edges whose depended-upon trigger is in `triggers`.
    fn edges_by_up(&self, triggers: &[EntityId]) -> Result<Vec<DependencyEdge>>;

    /// Insert `(trigger_down, trigger_up)` pairs in one batch.
    fn insert_edges(&mut self, edges: &[(EntityId, EntityId)]) -> Result<Vec<DependencyId>>;

    /// Delete edges by id.
    fn delete_edges(&mut self, ids: &[DependencyId]) -> Result<()>;
}

/// Unit-of-work boundary.
pub trait Transactional {
    /// Run `f` as one transaction. When `f` fails nothing it wrote is kept.
    fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>;
}

/// Everything the engine needs from storage.
pub trait Store:
    Catalog + ItemInheritance + DependencyStore + EntityStore<Graph> + EntityStore<Trigger> + Transactional
{
}

impl<S> Store for S where
    S: Catalog
        + ItemInheritance
        + DependencyStore
        + EntityStore<Graph>
        + EntityStore<Trigger>
        + Transactional
{
}
