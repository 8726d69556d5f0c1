//! Integration test suite for tplsync
//!
//! End-to-end tests that drive the public engine API against a populated
//! [`MemoryStore`], and the `tplsync` binary against JSON state files.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **propagation**: fan-out, multi-level inheritance, idempotence, deferral
//! - **conflicts**: name and rename collisions, adoption, all-or-nothing batches
//! - **dependencies**: consistency checks, cycles, scope rules, inherited edges
//! - **lifecycle**: create, update, delete, unlink and transaction rollback
//! - **cli**: the `tplsync` binary

use anyhow::Error;
use tplsync::config::EngineConfig;
use tplsync::core::SyncError;
use tplsync::engine::{Engine, RequestContext};
use tplsync::model::{EntityDraft, EntityId, EntityKind};
use tplsync::store::MemoryStore;
use tplsync::store::memory::KindTable;

mod cli;
mod conflicts;
mod dependencies;
mod lifecycle;
mod propagation;

/// An engine over `store` with the default configuration.
pub fn engine(store: &mut MemoryStore) -> Engine<'_, MemoryStore> {
    Engine::new(store, EngineConfig::default())
}

pub fn ctx() -> RequestContext {
    RequestContext::new("integration-test")
}

/// An update draft carrying the stored state of `id`.
pub fn draft_of<K: EntityKind>(store: &MemoryStore, id: EntityId) -> EntityDraft<K>
where
    MemoryStore: KindTable<K>,
{
    let entity = store.entity::<K>(id).expect("entity exists");
    EntityDraft {
        id: Some(entity.id),
        name: entity.name.clone(),
        flags: entity.flags,
        header: entity.header.clone(),
        items: entity.items.clone(),
        dependencies: None,
    }
}

/// The engine rejection carried by `error`.
pub fn sync_error(error: &Error) -> &SyncError {
    error.downcast_ref::<SyncError>().unwrap_or_else(|| panic!("not a SyncError: {error:#}"))
}
