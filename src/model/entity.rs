use super::host::DiscoveryFlag;
use super::ids::{DependencyId, EntityId, ItemId, SubItemId};
use super::kind::EntityKind;
use serde::{Deserialize, Serialize};

/// One row of an entity's ordered item list: a graph item or a trigger function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct SubItem<K: EntityKind> {
    /// Assigned by the store; `None` for rows not yet written.
    #[serde(default)]
    pub id: Option<SubItemId>,
    pub item_id: ItemId,
    pub ordinal: u32,
    pub attrs: K::ItemAttrs,
}

impl<K: EntityKind> SubItem<K> {
    pub fn new(item_id: ItemId, ordinal: u32, attrs: K::ItemAttrs) -> Self {
        Self {
            id: None,
            item_id,
            ordinal,
            attrs,
        }
    }
}

/// A stored graph or trigger.
///
/// `origin_id` is set on clones and names the template entity the clone was
/// derived from. Clones are never edited directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Entity<K: EntityKind> {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub origin_id: Option<EntityId>,
    #[serde(default)]
    pub flags: DiscoveryFlag,
    pub header: K::Header,
    #[serde(default = "Vec::new")]
    pub items: Vec<SubItem<K>>,
}

impl<K: EntityKind> Entity<K> {
    #[must_use]
    pub const fn is_clone(&self) -> bool {
        self.origin_id.is_some()
    }

    /// Sub-items sorted by ordinal.
    pub fn ordered_items(&self) -> Vec<&SubItem<K>> {
        let mut items: Vec<&SubItem<K>> = self.items.iter().collect();
        items.sort_by_key(|item| item.ordinal);
        items
    }

    /// Every item the entity references: sub-items in ordinal order, then header references.
    pub fn item_ids(&self) -> Vec<ItemId> {
        self.ordered_items()
            .into_iter()
            .map(|item| item.item_id)
            .chain(K::header_items(&self.header))
            .collect()
    }
}

/// Entity content without an identifier, as handed to the store for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntity<K: EntityKind> {
    pub name: String,
    pub origin_id: Option<EntityId>,
    pub flags: DiscoveryFlag,
    pub header: K::Header,
    pub items: Vec<SubItem<K>>,
}

impl<K: EntityKind> NewEntity<K> {
    pub(crate) fn into_entity(self, id: EntityId) -> Entity<K> {
        Entity {
            id,
            name: self.name,
            origin_id: self.origin_id,
            flags: self.flags,
            header: self.header,
            items: self.items,
        }
    }
}

/// Authored input for create and update operations.
///
/// `id` is required for updates and ignored for creates. `dependencies` lists the
/// triggers this trigger depends on; `None` leaves existing dependencies untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct EntityDraft<K: EntityKind> {
    #[serde(default)]
    pub id: Option<EntityId>,
    pub name: String,
    #[serde(default)]
    pub flags: DiscoveryFlag,
    pub header: K::Header,
    pub items: Vec<SubItem<K>>,
    #[serde(default)]
    pub dependencies: Option<Vec<EntityId>>,
}

impl<K: EntityKind> EntityDraft<K> {
    pub fn new(name: impl Into<String>, header: K::Header, items: Vec<SubItem<K>>) -> Self {
        Self {
            id: None,
            name: name.into(),
            flags: DiscoveryFlag::Normal,
            header,
            items,
            dependencies: None,
        }
    }

    #[must_use]
    pub const fn with_id(mut self, id: EntityId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn with_dependencies(mut self, dependencies: Vec<EntityId>) -> Self {
        self.dependencies = Some(dependencies);
        self
    }

    /// Every item the draft references, sub-items first.
    pub fn item_ids(&self) -> Vec<ItemId> {
        let mut items: Vec<&SubItem<K>> = self.items.iter().collect();
        items.sort_by_key(|item| item.ordinal);
        items
            .into_iter()
            .map(|item| item.item_id)
            .chain(K::header_items(&self.header))
            .collect()
    }
}

/// Trigger dependency: `trigger_down` is suppressed while `trigger_up` is in problem state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub id: DependencyId,
    pub trigger_down: EntityId,
    pub trigger_up: EntityId,
}
