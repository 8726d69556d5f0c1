//! Propagation of template entities to inheriting hosts.
//!
//! - [`LinkGraph`] answers which hosts a template reaches
//! - [`Membership`] derives entity host membership from item ownership
//! - [`ItemResolver`] maps template items to host items
//! - [`ConflictDetector`] decides update, adopt or create per target host
//! - [`Materializer`] runs the level loop and batches the writes

pub mod conflict;
pub mod item_resolver;
pub mod link_graph;
pub mod materializer;
pub mod membership;

pub use conflict::{ConflictDetector, Disposition};
pub use item_resolver::{ItemResolver, Resolved};
pub use link_graph::LinkGraph;
pub use materializer::{Materializer, diff_sub_items};
pub use membership::Membership;
