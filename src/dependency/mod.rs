//! Trigger dependency validation and inheritance.
//!
//! - [`DependencyGraph`] is the in-memory "depends on" relation used for cycle checks
//! - [`DependencyChecker`] validates dependency and membership changes before any write
//! - [`DependencyInheritor`] mirrors template dependency edits onto every clone level

pub mod checker;
pub mod graph;
pub mod inherit;

pub use checker::{DependencyChecker, DependencyPlan, TriggerChange};
pub use graph::DependencyGraph;
pub use inherit::DependencyInheritor;
