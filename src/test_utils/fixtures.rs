//! Fixture builder for populated in-memory stores.
//!
//! Host ids and entity ids are assigned sequentially starting at 1, graphs and
//! triggers sharing one counter, so tests can refer to rows by the values the
//! builder returns. Builder methods panic on misuse.

use crate::config::EngineConfig;
use crate::engine::{Engine, RequestContext};
use crate::model::{
    DependencyId, DiscoveryFlag, Entity, EntityId, EntityKind, Graph, GraphHeader, GraphItemAttrs,
    Host, HostId, HostStatus, Item, ItemId, SubItem, Trigger, TriggerFunction, TriggerHeader,
};
use crate::store::MemoryStore;
use crate::store::memory::KindTable;

const COLORS: [&str; 6] = ["1A7C11", "F63100", "2774A4", "A54F10", "FC6EA3", "6C59DC"];

/// Builds a [`MemoryStore`] fixture.
#[derive(Debug, Default)]
pub struct StoreBuilder {
    store: MemoryStore,
    next_host: u64,
    next_entity: u64,
}

impl StoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn template(&mut self, name: &str) -> HostId {
        self.add_host(name, HostStatus::Template, DiscoveryFlag::Normal)
    }

    pub fn host(&mut self, name: &str) -> HostId {
        self.add_host(name, HostStatus::Monitored, DiscoveryFlag::Normal)
    }

    /// A host that must never receive propagated entities.
    pub fn discovered_host(&mut self, name: &str) -> HostId {
        self.add_host(name, HostStatus::Monitored, DiscoveryFlag::Discovered)
    }

    fn add_host(&mut self, name: &str, status: HostStatus, flags: DiscoveryFlag) -> HostId {
        self.next_host += 1;
        let id = HostId(self.next_host);
        self.store.upsert_host(Host {
            id,
            name: name.to_string(),
            status,
            flags,
        });
        id
    }

    pub fn item(&mut self, host: HostId, key: &str) -> ItemId {
        let id = self.store.next_item_id();
        self.store.upsert_item(Item {
            id,
            host_id: host,
            key: key.to_string(),
            origin_id: None,
        });
        id
    }

    /// Link `template` to `host` and copy the template's items down, like the
    /// item-inheritance step does.
    pub fn link(&mut self, template: HostId, host: HostId) -> &mut Self {
        self.link_without_items(template, host);
        self.store.inherit_template_items(template, host).expect("inherit template items");
        self
    }

    /// Link without creating item links; propagation to `host` cannot resolve items.
    pub fn link_without_items(&mut self, template: HostId, host: HostId) -> &mut Self {
        self.store.link_template(template, host).expect("link template");
        self
    }

    /// Let the store create missing item links when the engine asks for them.
    pub fn auto_link_items(&mut self) -> &mut Self {
        self.store.set_auto_link_items(true);
        self
    }

    /// An authored graph drawing `items` in order.
    pub fn graph(&mut self, name: &str, items: &[ItemId]) -> EntityId {
        let items = items
            .iter()
            .enumerate()
            .map(|(ordinal, item)| {
                SubItem::new(*item, ordinal as u32, GraphItemAttrs::colored(COLORS[ordinal % COLORS.len()]))
            })
            .collect();
        self.add_entity::<Graph>(name, GraphHeader::default(), items)
    }

    /// An authored trigger firing when any of `items` reports a positive value.
    pub fn trigger(&mut self, name: &str, items: &[ItemId]) -> EntityId {
        let expression = (0..items.len())
            .map(|ordinal| format!("{{{ordinal}}}>0"))
            .collect::<Vec<_>>()
            .join(" or ");
        let items = items
            .iter()
            .enumerate()
            .map(|(ordinal, item)| SubItem::new(*item, ordinal as u32, TriggerFunction::new("last", "")))
            .collect();
        self.add_entity::<Trigger>(name, TriggerHeader::new(expression), items)
    }

    fn add_entity<K: EntityKind>(&mut self, name: &str, header: K::Header, items: Vec<SubItem<K>>) -> EntityId
    where
        MemoryStore: KindTable<K>,
    {
        let stored = self
            .store
            .all_entities::<Graph>()
            .iter()
            .map(|entity| entity.id.get())
            .chain(self.store.all_entities::<Trigger>().iter().map(|entity| entity.id.get()))
            .max()
            .unwrap_or(0);
        self.next_entity = self.next_entity.max(stored) + 1;
        let id = EntityId(self.next_entity);
        self.store.put_entity(Entity {
            id,
            name: name.to_string(),
            origin_id: None,
            flags: DiscoveryFlag::Normal,
            header,
            items,
        });
        id
    }

    /// `down` depends on `up`.
    pub fn depend(&mut self, down: EntityId, up: EntityId) -> DependencyId {
        self.store.put_dependency(down, up)
    }

    /// Propagate every authored template graph and trigger with the default configuration.
    pub fn propagate_all(&mut self) -> &mut Self {
        let ctx = RequestContext::system();
        let mut engine = Engine::new(&mut self.store, EngineConfig::default());
        let graphs = engine.store().template_roots::<Graph>();
        engine.propagate::<Graph>(&ctx, &graphs, None).expect("propagate graphs");
        let triggers = engine.store().template_roots::<Trigger>();
        engine.propagate::<Trigger>(&ctx, &triggers, None).expect("propagate triggers");
        self.store.take_writes();
        self
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Finish the fixture with an empty write log.
    pub fn build(mut self) -> MemoryStore {
        self.store.take_writes();
        self.store
    }
}

/// The item with `key` on `host`.
pub fn item_on(store: &MemoryStore, host: HostId, key: &str) -> Option<ItemId> {
    store.items_on(host).into_iter().find(|item| item.key == key).map(|item| item.id)
}

/// The clone of `origin` living on `host`.
pub fn clone_on<K: EntityKind>(store: &MemoryStore, origin: EntityId, host: HostId) -> Option<EntityId>
where
    MemoryStore: KindTable<K>,
{
    store
        .all_entities::<K>()
        .into_iter()
        .filter(|entity| entity.origin_id == Some(origin))
        .find(|entity| {
            entity
                .item_ids()
                .iter()
                .any(|item| store.item(*item).is_some_and(|item| item.host_id == host))
        })
        .map(|entity| entity.id)
}
