//! tplsync - template inheritance for monitoring configuration
//!
//! Graphs and triggers defined on a template must exist on every host and child
//! template linked to it. tplsync materializes those clones, keeps them in step with
//! their origin across edits and renames, rejects conflicting state, and keeps the
//! trigger dependency relation acyclic and within the scope of the hosts involved.
//!
//! # Architecture Overview
//!
//! - A template entity is a graph or trigger whose items all live on templates
//! - Propagation walks the template link graph level by level; clones on child
//!   templates become the sources of the next level
//! - Item references are re-pointed through item links created by an external
//!   item-inheritance step
//! - Every engine request runs in one store transaction and either applies fully
//!   or leaves the store untouched
//!
//! # Core Modules
//!
//! - [`model`] - hosts, items, entities and the [`model::EntityKind`] capability trait
//! - [`store`] - storage traits and the in-memory reference store
//! - [`inheritance`] - link graph, item resolution, conflict detection, materializer
//! - [`dependency`] - trigger dependency graph, consistency checks and inheritance
//! - [`engine`] - request orchestration: create, update, delete, sync, unlink
//! - [`config`] - engine configuration (`~/.tplsync/config.toml`)
//! - [`core`] - error types and user-facing error rendering
//! - [`cli`] - the `tplsync` command-line tool
//!
//! # Example
//!
//! ```rust,no_run
//! use tplsync::config::EngineConfig;
//! use tplsync::engine::{Engine, RequestContext};
//! use tplsync::model::{HostId, Trigger};
//! use tplsync::store::MemoryStore;
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut store = MemoryStore::load("state.json".as_ref())?;
//! let mut engine = Engine::new(&mut store, EngineConfig::load(None)?);
//! let ctx = RequestContext::new("admin");
//! let report = engine.sync_templates::<Trigger>(&ctx, &[HostId(1)], &[HostId(10)])?;
//! println!("{} triggers created, {} updated", report.created, report.updated);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod dependency;
pub mod engine;
pub mod inheritance;
pub mod model;
pub mod store;

// test utilities (available for tests and with the test-utils feature)
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
