//! Error handling for tplsync
//!
//! The error system has two layers:
//! 1. [`SyncError`] - strongly-typed rejections raised by the propagation engine,
//!    the dependency checker, and the store
//! 2. [`ErrorContext`] - a wrapper that adds details and an actionable suggestion
//!    for command-line users
//!
//! Every [`SyncError`] raised inside an engine operation aborts the whole
//! operation: the surrounding transaction is rolled back, so callers never
//! observe a partially applied batch.
//!
//! # Examples
//!
//! ```rust,no_run
//! use tplsync::core::{SyncError, user_friendly_error};
//!
//! let error = SyncError::DependencyCycle {
//!     trigger: "CPU high".to_string(),
//!     trigger_up: "Host down".to_string(),
//!     chain: "CPU high -> Host down -> CPU high".to_string(),
//! };
//! user_friendly_error(anyhow::Error::new(error)).display();
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// Why a name collision was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionReason {
    /// The same-name entity on the target host is a clone of a different template entity.
    InheritedFromAnotherTemplate,
    /// The same-name entity is authored on the host with different discovery flags.
    FlagsDiffer,
    /// The same-name entity is authored on the host but its items differ.
    ItemsNotIdentical,
    /// The same-name entity is authored on the host and its structure differs.
    StructureNotIdentical,
    /// Two entities in one batch would land on the same host under the same name.
    DuplicateInBatch,
    /// A same-name entity already exists on the authoring host.
    AlreadyExists,
}

impl fmt::Display for CollisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::InheritedFromAnotherTemplate => "it is inherited from another template",
            Self::FlagsDiffer => "its discovery flags differ",
            Self::ItemsNotIdentical => "its items are not identical",
            Self::StructureNotIdentical => "its definition is not identical",
            Self::DuplicateInBatch => "it is defined more than once in the request",
            Self::AlreadyExists => "it already exists",
        };
        f.write_str(text)
    }
}

/// Errors raised by tplsync operations.
///
/// Message texts name the entities involved by their display names so they can be
/// surfaced to users unchanged.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A propagated entity collides by name with an entity on the target host.
    #[error("Cannot inherit {kind} \"{name}\" to \"{host}\": a {kind} with the same name exists and {reason}")]
    NameCollision {
        /// Entity kind label ("graph" or "trigger")
        kind: &'static str,
        /// Name of the colliding entity
        name: String,
        /// Display name of the target host
        host: String,
        /// Why the existing entity cannot be matched
        reason: CollisionReason,
    },

    /// Renaming an entity would collide with a different entity on a host that already has a clone.
    #[error("Cannot rename {kind} \"{from}\" to \"{to}\": {kind} \"{to}\" already exists on \"{host}\"")]
    RenameCollision {
        /// Entity kind label
        kind: &'static str,
        /// Previous name of the clone
        from: String,
        /// New name carried by the template entity
        to: String,
        /// Display name of the host holding the clone
        host: String,
    },

    /// No host in the target set could resolve a template item of the entity.
    #[error("Cannot inherit {kind} \"{name}\": item \"{item}\" is not linked on \"{host}\"")]
    UnresolvedItemLink {
        /// Entity kind label
        kind: &'static str,
        /// Entity name
        name: String,
        /// Key of the template item that has no counterpart
        item: String,
        /// Display name of the host that was tried
        host: String,
    },

    /// A dependency edge no longer has any host both triggers reach.
    #[error("Trigger \"{trigger}\" cannot depend on trigger \"{trigger_up}\": they no longer share a host")]
    DependencyUnsatisfiable {
        /// Name of the dependent trigger
        trigger: String,
        /// Name of the trigger depended upon
        trigger_up: String,
    },

    /// An edge would create a cycle in the dependency relation.
    #[error("Cannot create dependency on trigger \"{trigger_up}\" for trigger \"{trigger}\": circular dependency {chain}")]
    DependencyCycle {
        /// Name of the dependent trigger
        trigger: String,
        /// Name of the trigger depended upon
        trigger_up: String,
        /// Rendered cycle, for example `A -> B -> A`
        chain: String,
    },

    /// An edge breaks the template/host scope rules for dependencies.
    #[error("Cannot create dependency on trigger \"{trigger_up}\" for trigger \"{trigger}\": {reason}")]
    DependencyScopeViolation {
        /// Name of the dependent trigger
        trigger: String,
        /// Name of the trigger depended upon
        trigger_up: String,
        /// Rule that was broken
        reason: String,
    },

    /// The same dependency is listed more than once.
    #[error("Duplicate dependency on trigger \"{trigger_up}\" for trigger \"{trigger}\"")]
    DuplicateDependency {
        /// Name of the dependent trigger
        trigger: String,
        /// Name of the trigger depended upon
        trigger_up: String,
    },

    /// An entity spans several templates whose linked host sets differ.
    #[error("{kind} \"{name}\" belongs to templates with different linkages")]
    InconsistentLinkage {
        /// Entity kind label
        kind: &'static str,
        /// Entity name
        name: String,
    },

    /// Direct modification of an inherited entity was requested.
    #[error("Cannot {operation} templated {kind} \"{name}\"")]
    ReadOnlyClone {
        /// Entity kind label
        kind: &'static str,
        /// Entity name
        name: String,
        /// Requested operation ("update" or "delete")
        operation: &'static str,
    },

    /// A referenced entity, host, or item does not exist.
    #[error("{kind} with ID {id} does not exist")]
    EntityNotFound {
        /// What was looked up ("graph", "trigger", "host", "item")
        kind: &'static str,
        /// Identifier that was not found
        id: u64,
    },

    /// Authored input failed validation.
    #[error("Invalid {kind} \"{name}\": {reason}")]
    InvalidEntity {
        /// Entity kind label
        kind: &'static str,
        /// Entity name
        name: String,
        /// Validation failure
        reason: String,
    },

    /// Propagation kept producing new levels beyond the configured bound.
    #[error("Inheritance of {kind} entities exceeded {max} levels")]
    InheritanceDepthExceeded {
        /// Entity kind label
        kind: &'static str,
        /// Configured maximum depth
        max: usize,
    },

    /// The storage collaborator rejected an operation.
    #[error("Store error during {operation}: {reason}")]
    Store {
        /// Operation that failed
        operation: String,
        /// Reason reported by the store
        reason: String,
    },

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the problem
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON state parsing error
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl Clone for SyncError {
    fn clone(&self) -> Self {
        match self {
            Self::NameCollision {
                kind,
                name,
                host,
                reason,
            } => Self::NameCollision {
                kind: *kind,
                name: name.clone(),
                host: host.clone(),
                reason: *reason,
            },
            Self::RenameCollision {
                kind,
                from,
                to,
                host,
            } => Self::RenameCollision {
                kind: *kind,
                from: from.clone(),
                to: to.clone(),
                host: host.clone(),
            },
            Self::UnresolvedItemLink {
                kind,
                name,
                item,
                host,
            } => Self::UnresolvedItemLink {
                kind: *kind,
                name: name.clone(),
                item: item.clone(),
                host: host.clone(),
            },
            Self::DependencyUnsatisfiable {
                trigger,
                trigger_up,
            } => Self::DependencyUnsatisfiable {
                trigger: trigger.clone(),
                trigger_up: trigger_up.clone(),
            },
            Self::DependencyCycle {
                trigger,
                trigger_up,
                chain,
            } => Self::DependencyCycle {
                trigger: trigger.clone(),
                trigger_up: trigger_up.clone(),
                chain: chain.clone(),
            },
            Self::DependencyScopeViolation {
                trigger,
                trigger_up,
                reason,
            } => Self::DependencyScopeViolation {
                trigger: trigger.clone(),
                trigger_up: trigger_up.clone(),
                reason: reason.clone(),
            },
            Self::DuplicateDependency {
                trigger,
                trigger_up,
            } => Self::DuplicateDependency {
                trigger: trigger.clone(),
                trigger_up: trigger_up.clone(),
            },
            Self::InconsistentLinkage {
                kind,
                name,
            } => Self::InconsistentLinkage {
                kind: *kind,
                name: name.clone(),
            },
            Self::ReadOnlyClone {
                kind,
                name,
                operation,
            } => Self::ReadOnlyClone {
                kind: *kind,
                name: name.clone(),
                operation: *operation,
            },
            Self::EntityNotFound {
                kind,
                id,
            } => Self::EntityNotFound {
                kind: *kind,
                id: *id,
            },
            Self::InvalidEntity {
                kind,
                name,
                reason,
            } => Self::InvalidEntity {
                kind: *kind,
                name: name.clone(),
                reason: reason.clone(),
            },
            Self::InheritanceDepthExceeded {
                kind,
                max,
            } => Self::InheritanceDepthExceeded {
                kind: *kind,
                max: *max,
            },
            Self::Store {
                operation,
                reason,
            } => Self::Store {
                operation: operation.clone(),
                reason: reason.clone(),
            },
            Self::Config {
                message,
            } => Self::Config {
                message: message.clone(),
            },
            // io, json and toml errors don't implement Clone; keep the message
            Self::Io(e) => Self::Io(std::io::Error::new(e.kind(), e.to_string())),
            Self::JsonParse(e) => Self::Config {
                message: format!("JSON parsing error: {e}"),
            },
            Self::TomlParse(e) => Self::Config {
                message: format!("TOML parsing error: {e}"),
            },
        }
    }
}

impl SyncError {
    /// Returns `true` for rejections caused by the requested change itself,
    /// as opposed to infrastructure failures.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        !matches!(
            self,
            Self::Store { .. }
                | Self::Config { .. }
                | Self::Io(_)
                | Self::JsonParse(_)
                | Self::TomlParse(_)
        )
    }
}

/// Error wrapper carrying user-facing details and a suggestion.
///
/// # Examples
///
/// ```rust,no_run
/// use tplsync::core::{ErrorContext, SyncError};
///
/// let context = ErrorContext::new(SyncError::Config {
///     message: "write_batch_size must be positive".to_string(),
/// })
/// .with_suggestion("Set write_batch_size to a value of at least 1");
/// ```
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: SyncError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context without suggestion or details.
    #[must_use]
    pub const fn new(error: SyncError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr with terminal colors.
    ///
    /// The error line is red, details are yellow and the suggestion is green.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into an [`ErrorContext`] suitable for the command line.
///
/// Known [`SyncError`] variants get tailored suggestions. Anything else is wrapped
/// with its full context chain as details.
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(context) = error.downcast_ref::<ErrorContext>() {
        return ErrorContext {
            error: context.error.clone(),
            suggestion: context.suggestion.clone(),
            details: context.details.clone(),
        };
    }

    if let Some(sync_error) = error.downcast_ref::<SyncError>() {
        return create_error_context(sync_error.clone());
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        let context =
            ErrorContext::new(SyncError::Io(std::io::Error::new(io_error.kind(), io_error.to_string())));
        return match io_error.kind() {
            std::io::ErrorKind::NotFound => context
                .with_suggestion("Check that the state file exists and the path is correct"),
            std::io::ErrorKind::PermissionDenied => {
                context.with_suggestion("Check the permissions of the state file and its directory")
            }
            _ => context,
        };
    }

    let chain: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
    let context = ErrorContext::new(SyncError::Store {
        operation: "request".to_string(),
        reason: error.to_string(),
    });
    if chain.is_empty() {
        context
    } else {
        context.with_details(chain.join(": "))
    }
}

fn create_error_context(error: SyncError) -> ErrorContext {
    match &error {
        SyncError::NameCollision {
            reason,
            ..
        } => {
            let suggestion = match reason {
                CollisionReason::InheritedFromAnotherTemplate => {
                    "Rename the entity on one of the templates so the names no longer clash"
                }
                CollisionReason::FlagsDiffer
                | CollisionReason::ItemsNotIdentical
                | CollisionReason::StructureNotIdentical => {
                    "Rename or delete the host entity, or make it identical to the template entity so it can be adopted"
                }
                CollisionReason::DuplicateInBatch => "Give each entity in the request a distinct name",
                CollisionReason::AlreadyExists => "Choose a different name",
            };
            ErrorContext::new(error.clone()).with_suggestion(suggestion)
        }
        SyncError::RenameCollision {
            ..
        } => ErrorContext::new(error.clone())
            .with_suggestion("Rename or remove the conflicting entity on the host first"),
        SyncError::UnresolvedItemLink {
            ..
        } => ErrorContext::new(error.clone())
            .with_details("Every item used by a template entity must be inherited by the target host")
            .with_suggestion("Link the template items to the host before propagating"),
        SyncError::DependencyCycle {
            ..
        } => ErrorContext::new(error.clone())
            .with_suggestion("Remove one of the dependencies that form the cycle"),
        SyncError::DependencyUnsatisfiable {
            ..
        } => ErrorContext::new(error.clone())
            .with_details("A trigger may only depend on triggers that reach at least one common host")
            .with_suggestion("Remove the dependency before moving the trigger"),
        SyncError::DependencyScopeViolation {
            ..
        } => ErrorContext::new(error.clone()).with_details(
            "Template triggers may depend on triggers of the same template, of templates linked \
             to every host of the dependent template, or on host triggers",
        ),
        SyncError::InconsistentLinkage {
            ..
        } => ErrorContext::new(error.clone())
            .with_suggestion("Link all templates used by the entity to the same hosts"),
        SyncError::ReadOnlyClone {
            ..
        } => ErrorContext::new(error.clone())
            .with_suggestion("Change the template entity instead, or unlink the template and keep its clones"),
        SyncError::InheritanceDepthExceeded {
            ..
        } => ErrorContext::new(error.clone())
            .with_details("The template link graph is deeper than max_inheritance_depth")
            .with_suggestion("Raise max_inheritance_depth in the configuration file"),
        SyncError::Config {
            ..
        }
        | SyncError::TomlParse(_) => ErrorContext::new(error.clone())
            .with_suggestion("Check the configuration file at ~/.tplsync/config.toml"),
        SyncError::JsonParse(_) => ErrorContext::new(error.clone())
            .with_suggestion("Check that the state file is valid JSON"),
        _ => ErrorContext::new(error.clone()),
    }
}
