//! Dependency tracking for wave scheduling.
//!
//! The scheduler works on a flattened view of the workflow graph:
//! - `successors`: source -> targets, one entry per edge, from
//!   [`WorkflowGraph::successors`]
//! - `predecessors`: target -> sources, one entry per edge
//! - `indegree`: number of unfinished inbound edges per node
//!
//! When a node finishes (whatever its outcome) it is released: each outbound
//! edge is consumed once and targets whose indegree reaches zero become
//! ready. A node can be released only once, so each node is visited at most
//! once.

use crate::edge::Edge;
use crate::graph::WorkflowGraph;
use crate::node::{Node, NodeId};
use std::collections::{HashMap, HashSet};

/// Adjacency and indegree bookkeeping for one run.
#[derive(Debug, Clone, Default)]
pub struct Dependencies {
    successors: HashMap<NodeId, Vec<NodeId>>,
    predecessors: HashMap<NodeId, Vec<NodeId>>,
    indegree: HashMap<NodeId, usize>,
    roots: Vec<NodeId>,
    /// Node ids in declaration order.
    order: Vec<NodeId>,
    released: HashSet<NodeId>,
}

impl Dependencies {
    /// Builds the tracker from a validated graph.
    #[must_use]
    pub fn from_graph(graph: &WorkflowGraph) -> Self {
        let ids = |neighbours: Vec<(&Node, &Edge)>| -> Vec<NodeId> {
            neighbours.into_iter().map(|(node, _)| node.id.clone()).collect()
        };

        let mut deps = Self {
            roots: graph.entry_nodes().into_iter().map(|node| node.id.clone()).collect(),
            ..Self::default()
        };
        for node in graph.nodes() {
            let key = node.id.as_str();
            let predecessors = ids(graph.predecessors(key));
            deps.order.push(node.id.clone());
            deps.indegree.insert(node.id.clone(), predecessors.len());
            deps.predecessors.insert(node.id.clone(), predecessors);
            deps.successors.insert(node.id.clone(), ids(graph.successors(key)));
        }
        deps
    }

    /// Nodes with no inbound edges, in declaration order.
    #[must_use]
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Marks `node_id` as finished and consumes its outbound edges.
    ///
    /// Returns the successors that became ready, in edge declaration order.
    /// Releasing an unknown or already released node returns nothing.
    pub fn release(&mut self, node_id: &str) -> Vec<NodeId> {
        if !self.indegree.contains_key(node_id) || self.released.contains(node_id) {
            return Vec::new();
        }
        self.released.insert(NodeId::from(node_id));

        let targets = self.successors.get(node_id).cloned().unwrap_or_default();
        let mut ready = Vec::new();
        for target in targets {
            if let Some(count) = self.indegree.get_mut(&target) {
                *count = count.saturating_sub(1);
                if *count == 0 && !ready.contains(&target) {
                    ready.push(target);
                }
            }
        }
        ready
    }

    /// Direct upstream nodes of `node_id`, one entry per edge.
    #[must_use]
    pub fn predecessors(&self, node_id: &str) -> &[NodeId] {
        self.predecessors.get(node_id).map_or(&[], Vec::as_slice)
    }

    /// Returns true once every node has been released.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.released.len() == self.order.len()
    }

    /// Nodes not yet released, in declaration order.
    #[must_use]
    pub fn unreleased(&self) -> Vec<NodeId> {
        self.order
            .iter()
            .filter(|id| !self.released.contains(*id))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(nodes: &[&str], edges: &[(&str, &str)]) -> WorkflowGraph {
        WorkflowGraph::from_parts(
            nodes.iter().map(|id| Node::new(*id, "merge")),
            edges.iter().map(|(s, t)| Edge::new(*s, *t)),
        )
        .expect("valid graph")
    }

    fn ids(list: &[NodeId]) -> Vec<&str> {
        list.iter().map(NodeId::as_str).collect()
    }

    #[test]
    fn empty_graph_is_drained() {
        let deps = Dependencies::from_graph(&WorkflowGraph::new());
        assert!(deps.roots().is_empty());
        assert!(deps.is_drained());
    }

    #[test]
    fn linear_chain_releases_one_at_a_time() {
        let mut deps = Dependencies::from_graph(&graph(&["a", "b", "c"], &[("a", "b"), ("b", "c")]));

        assert_eq!(ids(deps.roots()), vec!["a"]);
        assert_eq!(ids(&deps.release("a")), vec!["b"]);
        assert_eq!(ids(&deps.release("b")), vec!["c"]);
        assert!(deps.release("c").is_empty());
        assert!(deps.is_drained());
    }

    #[test]
    fn join_waits_for_every_predecessor() {
        let mut deps = Dependencies::from_graph(&graph(&["a", "b", "c"], &[("a", "c"), ("b", "c")]));

        assert_eq!(ids(deps.roots()), vec!["a", "b"]);
        assert!(deps.release("a").is_empty());
        assert_eq!(ids(&deps.release("b")), vec!["c"]);
    }

    #[test]
    fn parallel_edges_each_count() {
        let mut deps = Dependencies::from_graph(&graph(&["a", "b"], &[("a", "b"), ("a", "b")]));

        assert_eq!(ids(deps.predecessors("b")), vec!["a", "a"]);
        assert_eq!(ids(&deps.release("a")), vec!["b"]);
    }

    #[test]
    fn releasing_twice_is_a_no_op() {
        let mut deps = Dependencies::from_graph(&graph(&["a", "b", "c"], &[("a", "c"), ("b", "c")]));

        assert!(deps.release("a").is_empty());
        assert!(deps.release("a").is_empty());
        assert_eq!(ids(&deps.release("b")), vec!["c"]);
    }

    #[test]
    fn unknown_node_releases_nothing() {
        let mut deps = Dependencies::from_graph(&graph(&["a"], &[]));
        assert!(deps.release("ghost").is_empty());
        assert!(!deps.is_drained());
    }

    #[test]
    fn unreleased_tracks_remaining_nodes() {
        let mut deps = Dependencies::from_graph(&graph(&["a", "b", "c"], &[("a", "b")]));
        deps.release("a");
        assert_eq!(ids(&deps.unreleased()), vec!["b", "c"]);
    }
}
