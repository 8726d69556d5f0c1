use crate::core::Result;
use crate::model::{Entity, EntityKind, HostId, ItemId};
use crate::store::Catalog;
use std::collections::{BTreeSet, HashMap};

/// Item ownership used to derive which hosts an entity belongs to.
#[derive(Debug, Clone, Default)]
pub struct Membership {
    item_hosts: HashMap<ItemId, HostId>,
    item_keys: HashMap<ItemId, String>,
}

impl Membership {
    pub fn load<C>(catalog: &C, items: impl IntoIterator<Item = ItemId>) -> Result<Self>
    where
        C: Catalog + ?Sized,
    {
        let mut membership = Self::default();
        membership.extend(catalog, items)?;
        Ok(membership)
    }

    /// Fetch the items not already known.
    pub fn extend<C>(&mut self, catalog: &C, items: impl IntoIterator<Item = ItemId>) -> Result<()>
    where
        C: Catalog + ?Sized,
    {
        let missing: BTreeSet<ItemId> =
            items.into_iter().filter(|id| !self.item_hosts.contains_key(id)).collect();
        if missing.is_empty() {
            return Ok(());
        }
        let ids: Vec<ItemId> = missing.into_iter().collect();
        for item in catalog.items(&ids)? {
            self.item_hosts.insert(item.id, item.host_id);
            self.item_keys.insert(item.id, item.key);
        }
        Ok(())
    }

    pub fn contains(&self, item: ItemId) -> bool {
        self.item_hosts.contains_key(&item)
    }

    pub fn host_of(&self, item: ItemId) -> Option<HostId> {
        self.item_hosts.get(&item).copied()
    }

    pub fn hosts_of_items(&self, items: &[ItemId]) -> BTreeSet<HostId> {
        items.iter().filter_map(|item| self.host_of(*item)).collect()
    }

    pub fn hosts_of<K: EntityKind>(&self, entity: &Entity<K>) -> BTreeSet<HostId> {
        self.hosts_of_items(&entity.item_ids())
    }

    /// Item key for messages, falling back to the id.
    pub fn item_key(&self, item: ItemId) -> String {
        self.item_keys.get(&item).cloned().unwrap_or_else(|| item.to_string())
    }

    #[cfg(test)]
    pub(crate) fn insert_for_test(&mut self, items: &[(u64, u64)]) {
        for (item, host) in items {
            self.item_hosts.insert(ItemId(*item), HostId(*host));
        }
    }
}
