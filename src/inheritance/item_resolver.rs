//! Translation of template items to their counterparts on inheriting hosts.

use crate::core::Result;
use crate::model::{Entity, EntityKind, HostId, ItemId, SubItem};
use crate::store::Catalog;
use std::collections::{BTreeSet, HashMap};

/// Entity content re-pointed at the items of one target host.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<K: EntityKind> {
    pub header: K::Header,
    /// Sub-items in ordinal order, without store ids.
    pub items: Vec<SubItem<K>>,
}

impl<K: EntityKind> Resolved<K> {
    /// Resolved item ids in the same order as [`Entity::item_ids`].
    pub fn item_ids(&self) -> Vec<ItemId> {
        self.items
            .iter()
            .map(|item| item.item_id)
            .chain(K::header_items(&self.header))
            .collect()
    }
}

/// Item link lookup for a batch of template items and hosts, fetched in one call.
#[derive(Debug, Clone, Default)]
pub struct ItemResolver {
    links: HashMap<(ItemId, HostId), ItemId>,
}

impl ItemResolver {
    pub fn load<C>(catalog: &C, template_items: &[ItemId], hosts: &[HostId]) -> Result<Self>
    where
        C: Catalog + ?Sized,
    {
        let links = catalog
            .item_links(template_items, hosts)?
            .into_iter()
            .map(|link| ((link.template_item_id, link.host_id), link.item_id))
            .collect();
        Ok(Self {
            links,
        })
    }

    pub fn resolve(&self, template_item: ItemId, host: HostId) -> Option<ItemId> {
        self.links.get(&(template_item, host)).copied()
    }

    /// Template items of `entity` with no counterpart on `host`.
    pub fn missing<K: EntityKind>(&self, entity: &Entity<K>, host: HostId) -> BTreeSet<ItemId> {
        entity.item_ids().into_iter().filter(|item| self.resolve(*item, host).is_none()).collect()
    }

    /// Re-point every item reference of `entity` at `host`.
    ///
    /// Returns the first template item that has no counterpart.
    pub fn resolve_entity<K: EntityKind>(
        &self,
        entity: &Entity<K>,
        host: HostId,
    ) -> std::result::Result<Resolved<K>, ItemId> {
        let mut items = Vec::with_capacity(entity.items.len());
        for item in entity.ordered_items() {
            let item_id = self.resolve(item.item_id, host).ok_or(item.item_id)?;
            items.push(SubItem {
                id: None,
                item_id,
                ordinal: item.ordinal,
                attrs: item.attrs.clone(),
            });
        }
        let header = K::map_header_items(&entity.header, &|item| self.resolve(item, host))?;
        Ok(Resolved {
            header,
            items,
        })
    }
}
