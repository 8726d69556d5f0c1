//! Trigger dependency graph for cycle detection.
//!
//! Edges point from the dependent trigger to the trigger it depends on, so a path
//! from `a` to `b` means `a` transitively depends on `b`. Adding the edge
//! `down -> up` closes a cycle exactly when a path `up -> down` already exists.

use crate::core::Result;
use crate::model::{DependencyId, EntityId};
use crate::store::DependencyStore;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet, VecDeque};

/// Color states for cycle detection using DFS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    /// Node has not been visited.
    White,
    /// Node is currently being visited (in the DFS stack).
    Gray,
    /// Node has been fully visited.
    Black,
}

/// Directed "depends on" graph over trigger ids.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<EntityId, ()>,
    node_map: HashMap<EntityId, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load everything the `seeds` depend on, transitively, one store call per level.
    ///
    /// Edges in `skip` are treated as already deleted.
    pub fn load<S>(store: &S, seeds: &[EntityId], skip: &HashSet<DependencyId>) -> Result<Self>
    where
        S: DependencyStore + ?Sized,
    {
        let mut graph = Self::new();
        let mut visited: HashSet<EntityId> = HashSet::new();
        let mut frontier: Vec<EntityId> =
            seeds.iter().copied().filter(|seed| visited.insert(*seed)).collect();

        while !frontier.is_empty() {
            let edges = store.edges_by_down(&frontier)?;
            frontier = Vec::new();
            for edge in edges.into_iter().filter(|edge| !skip.contains(&edge.id)) {
                graph.add_dependency(edge.trigger_down, edge.trigger_up);
                if visited.insert(edge.trigger_up) {
                    frontier.push(edge.trigger_up);
                }
            }
        }

        tracing::trace!(
            "Loaded dependency closure of {} triggers: {} nodes, {} edges",
            seeds.len(),
            graph.node_count(),
            graph.edge_count()
        );
        Ok(graph)
    }

    fn ensure_node(&mut self, node: EntityId) -> NodeIndex {
        if let Some(&index) = self.node_map.get(&node) {
            index
        } else {
            let index = self.graph.add_node(node);
            self.node_map.insert(node, index);
            index
        }
    }

    /// Record that `down` depends on `up`.
    pub fn add_dependency(&mut self, down: EntityId, up: EntityId) {
        let down_idx = self.ensure_node(down);
        let up_idx = self.ensure_node(up);

        if !self.graph.contains_edge(down_idx, up_idx) {
            self.graph.add_edge(down_idx, up_idx, ());
        }
    }

    /// Shortest dependency path from `from` to `to`, both included.
    pub fn path(&self, from: EntityId, to: EntityId) -> Option<Vec<EntityId>> {
        let start = *self.node_map.get(&from)?;
        let goal = *self.node_map.get(&to)?;
        let mut parents: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        let mut seen = HashSet::from([start]);

        while let Some(current) = queue.pop_front() {
            if current == goal {
                let mut path = vec![self.graph[current]];
                let mut cursor = current;
                while let Some(parent) = parents.get(&cursor) {
                    path.push(self.graph[*parent]);
                    cursor = *parent;
                }
                path.reverse();
                return Some(path);
            }
            for neighbor in self.graph.neighbors(current) {
                if seen.insert(neighbor) {
                    parents.insert(neighbor, current);
                    queue.push_back(neighbor);
                }
            }
        }
        None
    }

    /// Whether `down` depends on `up`, directly or transitively.
    pub fn depends_on(&self, down: EntityId, up: EntityId) -> bool {
        down != up && self.path(down, up).is_some()
    }

    /// Find a cycle using DFS with colors.
    ///
    /// Returns the cycle path with its first node repeated at the end.
    pub fn detect_cycle(&self) -> Option<Vec<EntityId>> {
        let mut colors: HashMap<NodeIndex, Color> =
            self.graph.node_indices().map(|node| (node, Color::White)).collect();
        let mut path: Vec<NodeIndex> = Vec::new();

        for node in self.graph.node_indices() {
            if matches!(colors.get(&node), Some(Color::White))
                && let Some(cycle) = self.dfs_visit(node, &mut colors, &mut path)
            {
                return Some(cycle.into_iter().map(|idx| self.graph[idx]).collect());
            }
        }
        None
    }

    fn dfs_visit(
        &self,
        node: NodeIndex,
        colors: &mut HashMap<NodeIndex, Color>,
        path: &mut Vec<NodeIndex>,
    ) -> Option<Vec<NodeIndex>> {
        colors.insert(node, Color::Gray);
        path.push(node);

        for neighbor in self.graph.neighbors(node) {
            match colors.get(&neighbor) {
                Some(Color::Gray) => {
                    let start = path.iter().position(|n| *n == neighbor).unwrap_or(0);
                    let mut cycle = path[start..].to_vec();
                    cycle.push(neighbor);
                    return Some(cycle);
                }
                Some(Color::White) => {
                    if let Some(cycle) = self.dfs_visit(neighbor, colors, path) {
                        return Some(cycle);
                    }
                }
                _ => {}
            }
        }

        path.pop();
        colors.insert(node, Color::Black);
        None
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}
