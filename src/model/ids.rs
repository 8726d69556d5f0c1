//! Opaque identifier newtypes.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Raw numeric value.
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(
    /// Identifier of a host or template.
    HostId
);
id_type!(
    /// Identifier of a monitored item.
    ItemId
);
id_type!(
    /// Identifier of a graph or trigger.
    EntityId
);
id_type!(
    /// Identifier of a graph item or trigger function row.
    SubItemId
);
id_type!(
    /// Identifier of a dependency edge.
    DependencyId
);

/// Correlates a row in a batched insert with the identifier the store assigns to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowKey(pub usize);
