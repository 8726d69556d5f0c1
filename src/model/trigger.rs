//! Trigger kind: a problem expression over functions of items.
//!
//! Expressions reference their function rows by ordinal, as `{0}`, `{1}` and so
//! on, so an expression can be copied to clones unchanged while the function rows
//! are re-pointed to the host items.

use super::kind::EntityKind;
use serde::{Deserialize, Serialize};

/// Marker for the trigger entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Trigger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[default]
    NotClassified,
    Information,
    Warning,
    Average,
    High,
    Disaster,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryMode {
    #[default]
    Expression,
    RecoveryExpression,
    None,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerHeader {
    pub expression: String,
    #[serde(default)]
    pub recovery_mode: RecoveryMode,
    #[serde(default)]
    pub recovery_expression: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub comments: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub manual_close: bool,
    #[serde(default)]
    pub opdata: String,
}

impl TriggerHeader {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            recovery_mode: RecoveryMode::Expression,
            recovery_expression: String::new(),
            priority: Priority::NotClassified,
            enabled: true,
            comments: String::new(),
            url: String::new(),
            manual_close: false,
            opdata: String::new(),
        }
    }
}

/// A function row of a trigger expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerFunction {
    pub function: String,
    #[serde(default)]
    pub parameter: String,
}

impl TriggerFunction {
    pub fn new(function: impl Into<String>, parameter: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            parameter: parameter.into(),
        }
    }
}

impl EntityKind for Trigger {
    const LABEL: &'static str = "trigger";
    const TABLE: &'static str = "triggers";
    const ITEM_TABLE: &'static str = "functions";
    const HAS_DEPENDENCIES: bool = true;

    type Header = TriggerHeader;
    type ItemAttrs = TriggerFunction;

    fn same_definition(authored: &TriggerHeader, incoming: &TriggerHeader) -> bool {
        authored.expression == incoming.expression
            && authored.recovery_mode == incoming.recovery_mode
            && authored.recovery_expression == incoming.recovery_expression
    }
}
