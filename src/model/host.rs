use super::ids::{HostId, ItemId};
use serde::{Deserialize, Serialize};

/// Monitoring status of a host. Templates are hosts with status `Template`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HostStatus {
    /// Host is actively monitored
    #[default]
    Monitored,
    /// Host exists but monitoring is disabled
    NotMonitored,
    /// Template that other hosts and templates link to
    Template,
}

/// Discovery flag of a host or entity.
///
/// Only `Normal` and `Created` participate in propagation; prototypes and the
/// objects discovered from them are managed by discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryFlag {
    /// Plain configuration object
    #[default]
    Normal,
    /// Object created from a prototype
    Created,
    /// Discovery prototype
    Prototype,
    /// Object discovered by a rule
    Discovered,
}

impl DiscoveryFlag {
    /// Whether hosts with this flag receive propagated entities.
    #[must_use]
    pub const fn is_propagation_eligible(self) -> bool {
        matches!(self, Self::Normal | Self::Created)
    }
}

/// A host or template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub id: HostId,
    pub name: String,
    #[serde(default)]
    pub status: HostStatus,
    #[serde(default)]
    pub flags: DiscoveryFlag,
}

impl Host {
    #[must_use]
    pub fn is_template(&self) -> bool {
        self.status == HostStatus::Template
    }
}

/// Directed link: `template_id` is inherited by `host_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TemplateLink {
    pub template_id: HostId,
    pub host_id: HostId,
}

/// A monitored item. When `origin_id` is set the item is the host-side
/// counterpart of that template item (an item link).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub host_id: HostId,
    pub key: String,
    #[serde(default)]
    pub origin_id: Option<ItemId>,
}

/// Resolved item link: `template_item_id` maps to `item_id` on `host_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemLink {
    pub template_item_id: ItemId,
    pub host_id: HostId,
    pub item_id: ItemId,
}
