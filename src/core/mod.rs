//! Core error types for tplsync
//!
//! Every engine operation returns [`Result`], an alias over [`anyhow::Result`] whose
//! error carries a [`SyncError`] when the failure is a rejection of the request.
//! Use [`user_friendly_error`] to turn any failure into an [`ErrorContext`] for the CLI.

pub mod error;

pub use error::{CollisionReason, ErrorContext, SyncError, user_friendly_error};

/// Result alias used across the crate.
pub type Result<T> = anyhow::Result<T>;
