use super::ids::{EntityId, HostId, ItemId};
use serde::Serialize;

/// Sub-item rows written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SubItemCounts {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl SubItemCounts {
    #[must_use]
    pub const fn total(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }

    pub fn add(&mut self, other: Self) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.deleted += other.deleted;
    }
}

/// Dependency edges written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EdgeCounts {
    pub inserted: usize,
    pub deleted: usize,
}

/// A (source, host) pair skipped because an item link was missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeferredTarget {
    pub entity: EntityId,
    pub name: String,
    pub host: HostId,
    pub host_name: String,
    /// Template items without a counterpart on the host.
    pub missing_items: Vec<ItemId>,
}

/// Outcome of one engine operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Inheritance levels that produced targets.
    pub levels: usize,
    pub created: usize,
    pub updated: usize,
    pub adopted: usize,
    /// Clones already identical to their source.
    pub unchanged: usize,
    pub deleted: usize,
    /// Clones turned into authored entities by an unlink that keeps them.
    pub detached: usize,
    pub sub_items: SubItemCounts,
    pub dependencies: EdgeCounts,
    pub deferred: Vec<DeferredTarget>,
}

impl SyncReport {
    /// Rows written by the operation.
    #[must_use]
    pub const fn writes(&self) -> usize {
        self.created
            + self.updated
            + self.adopted
            + self.deleted
            + self.detached
            + self.sub_items.total()
            + self.dependencies.inserted
            + self.dependencies.deleted
    }

    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.writes() == 0
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: Self) {
        self.levels = self.levels.max(other.levels);
        self.created += other.created;
        self.updated += other.updated;
        self.adopted += other.adopted;
        self.unchanged += other.unchanged;
        self.deleted += other.deleted;
        self.detached += other.detached;
        self.sub_items.add(other.sub_items);
        self.dependencies.inserted += other.dependencies.inserted;
        self.dependencies.deleted += other.dependencies.deleted;
        self.deferred.extend(other.deferred);
    }
}
