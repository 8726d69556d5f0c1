use serde::Serialize;
use uuid::Uuid;

/// Caller identity carried through one engine request.
///
/// The engine performs no permission checks; the context only labels the
/// tracing span of each operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub actor: String,
}

impl RequestContext {
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            actor: actor.into(),
        }
    }

    /// Context for requests issued by the engine's own tooling.
    pub fn system() -> Self {
        Self::new("system")
    }
}
