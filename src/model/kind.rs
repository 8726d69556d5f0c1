//! Capability descriptor for the entity kinds that propagate through templates.
//!
//! The propagation algorithm is written once over [`EntityKind`]. Graphs and
//! triggers differ only in their header and sub-item attribute types, in which
//! header fields reference items, and in whether dependency maintenance runs.

use super::ids::ItemId;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;

/// Kind-specific behaviour of a propagating entity.
pub trait EntityKind:
    fmt::Debug + Clone + Copy + PartialEq + Eq + Default + Send + Sync + 'static
{
    /// Human-readable label used in messages and logs.
    const LABEL: &'static str;
    /// Storage table of the entity header.
    const TABLE: &'static str;
    /// Storage table of the entity sub-items.
    const ITEM_TABLE: &'static str;
    /// Whether the kind carries a dependency relation that must stay consistent.
    const HAS_DEPENDENCIES: bool;

    /// Header fields copied verbatim (apart from item references) to clones.
    type Header: Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned + Send + Sync;
    /// Per sub-item attributes.
    type ItemAttrs: Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned + Send + Sync;

    /// Items referenced by header fields, outside the sub-item list.
    fn header_items(_header: &Self::Header) -> Vec<ItemId> {
        Vec::new()
    }

    /// Re-point header item references through `map`.
    ///
    /// Returns the first item `map` could not translate.
    fn map_header_items(
        header: &Self::Header,
        _map: &dyn Fn(ItemId) -> Option<ItemId>,
    ) -> Result<Self::Header, ItemId> {
        Ok(header.clone())
    }

    /// Whether an authored entity may be adopted as a clone of an entity with this header,
    /// given that their resolved items already match.
    fn same_definition(_authored: &Self::Header, _incoming: &Self::Header) -> bool {
        true
    }
}
