//! Test utilities for tplsync
//!
//! This module provides helpers for writing tests against the engine:
//! - [`StoreBuilder`] builds templates, hosts, items, links, graphs, triggers
//!   and dependency edges in a [`MemoryStore`](crate::store::MemoryStore)
//! - [`init_test_logging`] routes tracing output to the test harness
//!
//! # Example
//!
//! ```rust,no_run
//! use tplsync::test_utils::StoreBuilder;
//!
//! let mut builder = StoreBuilder::new();
//! let template = builder.template("Template OS Linux");
//! let host = builder.host("web-01");
//! let cpu = builder.item(template, "system.cpu.load");
//! builder.link(template, host);
//! builder.graph("CPU load", &[cpu]);
//! let store = builder.build();
//! ```

pub mod fixtures;

pub use fixtures::{StoreBuilder, clone_on, item_on};

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` when given, otherwise `RUST_LOG`. Without either, logging stays off.
///
/// ```bash
/// RUST_LOG=tplsync=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer() // Important: uses test-compatible writer
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}
