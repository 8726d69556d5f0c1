//! Data model: hosts, items, template links and the propagating entity kinds.
//!
//! Host membership of an entity is not stored; an entity belongs to every host
//! that owns one of the items it references.

pub mod entity;
pub mod graph;
pub mod host;
pub mod ids;
pub mod kind;
pub mod report;
pub mod trigger;

pub use entity::{DependencyEdge, Entity, EntityDraft, NewEntity, SubItem};
pub use graph::{
    CalcFunction, DrawType, Graph, GraphHeader, GraphItemAttrs, GraphType, YAxisBound, YAxisSide,
};
pub use host::{DiscoveryFlag, Host, HostStatus, Item, ItemLink, TemplateLink};
pub use ids::{DependencyId, EntityId, HostId, ItemId, RowKey, SubItemId};
pub use kind::EntityKind;
pub use report::{DeferredTarget, EdgeCounts, SubItemCounts, SyncReport};
pub use trigger::{Priority, RecoveryMode, Trigger, TriggerFunction, TriggerHeader};
