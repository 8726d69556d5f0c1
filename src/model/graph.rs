//! Graph kind: a chart over an ordered list of items.

use super::ids::ItemId;
use super::kind::EntityKind;
use serde::{Deserialize, Serialize};

/// Marker for the graph entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Graph;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GraphType {
    #[default]
    Normal,
    Stacked,
    Pie,
    Exploded,
}

/// Bound of a Y axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum YAxisBound {
    #[default]
    Calculated,
    Fixed {
        value: f64,
    },
    /// Bound taken from the last value of an item. The item follows the graph
    /// to every host the graph is cloned to.
    ItemValue {
        item_id: ItemId,
    },
}

impl YAxisBound {
    fn item(&self) -> Option<ItemId> {
        match self {
            Self::ItemValue {
                item_id,
            } => Some(*item_id),
            _ => None,
        }
    }

    fn remap(&self, map: &dyn Fn(ItemId) -> Option<ItemId>) -> Result<Self, ItemId> {
        match self {
            Self::ItemValue {
                item_id,
            } => map(*item_id)
                .map(|mapped| Self::ItemValue {
                    item_id: mapped,
                })
                .ok_or(*item_id),
            other => Ok(*other),
        }
    }
}

fn default_width() -> u32 {
    900
}

fn default_height() -> u32 {
    200
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphHeader {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default)]
    pub graph_type: GraphType,
    #[serde(default = "default_true")]
    pub show_legend: bool,
    #[serde(default = "default_true")]
    pub show_work_period: bool,
    #[serde(default = "default_true")]
    pub show_triggers: bool,
    #[serde(default)]
    pub show_3d: bool,
    #[serde(default)]
    pub percent_left: f64,
    #[serde(default)]
    pub percent_right: f64,
    #[serde(default)]
    pub ymin: YAxisBound,
    #[serde(default)]
    pub ymax: YAxisBound,
}

impl Default for GraphHeader {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            graph_type: GraphType::Normal,
            show_legend: true,
            show_work_period: true,
            show_triggers: true,
            show_3d: false,
            percent_left: 0.0,
            percent_right: 0.0,
            ymin: YAxisBound::Calculated,
            ymax: YAxisBound::Calculated,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DrawType {
    #[default]
    Line,
    Filled,
    Bold,
    Dot,
    Dashed,
    Gradient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum YAxisSide {
    #[default]
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CalcFunction {
    Min,
    #[default]
    Avg,
    Max,
    All,
    Last,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphItemAttrs {
    pub color: String,
    #[serde(default)]
    pub draw_type: DrawType,
    #[serde(default)]
    pub y_axis_side: YAxisSide,
    #[serde(default)]
    pub calc_fnc: CalcFunction,
}

impl GraphItemAttrs {
    pub fn colored(color: impl Into<String>) -> Self {
        Self {
            color: color.into(),
            draw_type: DrawType::Line,
            y_axis_side: YAxisSide::Left,
            calc_fnc: CalcFunction::Avg,
        }
    }
}

impl EntityKind for Graph {
    const LABEL: &'static str = "graph";
    const TABLE: &'static str = "graphs";
    const ITEM_TABLE: &'static str = "graphs_items";
    const HAS_DEPENDENCIES: bool = false;

    type Header = GraphHeader;
    type ItemAttrs = GraphItemAttrs;

    fn header_items(header: &GraphHeader) -> Vec<ItemId> {
        header.ymin.item().into_iter().chain(header.ymax.item()).collect()
    }

    fn map_header_items(
        header: &GraphHeader,
        map: &dyn Fn(ItemId) -> Option<ItemId>,
    ) -> Result<GraphHeader, ItemId> {
        Ok(GraphHeader {
            ymin: header.ymin.remap(map)?,
            ymax: header.ymax.remap(map)?,
            ..header.clone()
        })
    }
}
