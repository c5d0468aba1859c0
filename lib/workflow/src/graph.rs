//! Workflow graph implementation using petgraph.
//!
//! Workflows are directed acyclic graphs where:
//! - Nodes are typed units of work
//! - Edges carry a source node's output to a target node
//!
//! Declaration order matters: handlers receive inbound values in the order
//! their edges were declared, so lookups sort petgraph's adjacency lists by
//! edge index (insertion order) before returning them.

use crate::edge::Edge;
use crate::error::GraphError;
use crate::node::{Node, NodeId};
use petgraph::Direction;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet};

/// A validated-on-demand workflow graph.
#[derive(Debug, Clone, Default)]
pub struct WorkflowGraph {
    /// The underlying directed graph.
    graph: DiGraph<Node, Edge>,
    /// Map from NodeId to petgraph's NodeIndex for O(1) lookup.
    node_index_map: HashMap<NodeId, NodeIndex>,
}

impl WorkflowGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds and validates a graph from node and edge lists.
    ///
    /// # Errors
    ///
    /// Returns the first problem found: blank or duplicate ids, edges that
    /// reference unknown nodes, or a cycle.
    pub fn from_parts(
        nodes: impl IntoIterator<Item = Node>,
        edges: impl IntoIterator<Item = Edge>,
    ) -> Result<Self, GraphError> {
        let mut graph = Self::new();
        for node in nodes {
            graph.add_node(node)?;
        }
        for edge in edges {
            graph.add_edge(edge)?;
        }
        graph.validate()?;
        Ok(graph)
    }

    /// Adds a node.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is blank or already present.
    pub fn add_node(&mut self, node: Node) -> Result<(), GraphError> {
        if node.id.is_blank() {
            return Err(GraphError::EmptyNodeId);
        }
        if self.node_index_map.contains_key(&node.id) {
            return Err(GraphError::DuplicateNode { node_id: node.id });
        }
        let node_id = node.id.clone();
        let index = self.graph.add_node(node);
        self.node_index_map.insert(node_id, index);
        Ok(())
    }

    /// Adds an edge between two existing nodes.
    ///
    /// Parallel edges are kept; each one counts towards the target's indegree.
    ///
    /// # Errors
    ///
    /// Returns an error if either endpoint is unknown or the edge is a
    /// self-loop.
    pub fn add_edge(&mut self, edge: Edge) -> Result<(), GraphError> {
        let source_index = self.index_of(&edge, &edge.source)?;
        let target_index = self.index_of(&edge, &edge.target)?;

        if source_index == target_index {
            return Err(GraphError::CycleDetected {
                node_id: edge.source,
            });
        }

        self.graph.add_edge(source_index, target_index, edge);
        Ok(())
    }

    fn index_of(&self, edge: &Edge, node_id: &NodeId) -> Result<NodeIndex, GraphError> {
        self.node_index_map
            .get(node_id)
            .copied()
            .ok_or_else(|| GraphError::UnknownEdgeEndpoint {
                source: edge.source.clone(),
                target: edge.target.clone(),
                missing: node_id.clone(),
            })
    }

    /// Checks that the graph is acyclic.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::CycleDetected`] naming a node on the cycle.
    pub fn validate(&self) -> Result<(), GraphError> {
        self.topological_order().map(|_| ())
    }

    /// Returns node ids in a dependency-respecting order.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::CycleDetected`] if no such order exists.
    pub fn topological_order(&self) -> Result<Vec<NodeId>, GraphError> {
        let sorted = petgraph::algo::toposort(&self.graph, None).map_err(|cycle| {
            GraphError::CycleDetected {
                node_id: self.graph[cycle.node_id()].id.clone(),
            }
        })?;
        Ok(sorted
            .into_iter()
            .map(|index| self.graph[index].id.clone())
            .collect())
    }

    /// Returns a node by id.
    #[must_use]
    pub fn get_node(&self, node_id: &str) -> Option<&Node> {
        let index = self.node_index_map.get(node_id)?;
        self.graph.node_weight(*index)
    }

    /// Returns true if the node is part of the graph.
    #[must_use]
    pub fn contains(&self, node_id: &str) -> bool {
        self.node_index_map.contains_key(node_id)
    }

    /// Returns all nodes in declaration order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph.node_weights()
    }

    /// Returns all edges in declaration order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.graph.edge_weights()
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Upstream nodes of `node_id`, one entry per inbound edge, in edge
    /// declaration order.
    #[must_use]
    pub fn predecessors(&self, node_id: &str) -> Vec<(&Node, &Edge)> {
        self.neighbours(node_id, Direction::Incoming)
    }

    /// Downstream nodes of `node_id`, one entry per outbound edge, in edge
    /// declaration order.
    #[must_use]
    pub fn successors(&self, node_id: &str) -> Vec<(&Node, &Edge)> {
        self.neighbours(node_id, Direction::Outgoing)
    }

    fn neighbours(&self, node_id: &str, direction: Direction) -> Vec<(&Node, &Edge)> {
        let Some(&index) = self.node_index_map.get(node_id) else {
            return Vec::new();
        };

        let mut edges: Vec<(EdgeIndex, NodeIndex, &Edge)> = self
            .graph
            .edges_directed(index, direction)
            .map(|edge| {
                let other = match direction {
                    Direction::Incoming => edge.source(),
                    Direction::Outgoing => edge.target(),
                };
                (edge.id(), other, edge.weight())
            })
            .collect();
        edges.sort_by_key(|(edge_index, _, _)| *edge_index);

        edges
            .into_iter()
            .filter_map(|(_, other, edge)| Some((self.graph.node_weight(other)?, edge)))
            .collect()
    }

    /// Nodes with no inbound edges.
    pub fn entry_nodes(&self) -> Vec<&Node> {
        self.nodes_where(|index| self.degree(index, Direction::Incoming) == 0)
    }

    /// Nodes with no outbound edges.
    pub fn terminal_nodes(&self) -> Vec<&Node> {
        self.nodes_where(|index| self.degree(index, Direction::Outgoing) == 0)
    }

    /// Nodes whose value belongs to the run result: terminal nodes plus any
    /// node of a sink kind, in declaration order.
    pub fn output_nodes(&self) -> Vec<&Node> {
        let terminal: HashSet<&NodeId> = self
            .terminal_nodes()
            .into_iter()
            .map(|node| &node.id)
            .collect();
        self.nodes()
            .filter(|node| terminal.contains(&node.id) || node.kind.is_sink())
            .collect()
    }

    fn degree(&self, index: NodeIndex, direction: Direction) -> usize {
        self.graph.edges_directed(index, direction).count()
    }

    fn nodes_where(&self, keep: impl Fn(NodeIndex) -> bool) -> Vec<&Node> {
        self.graph
            .node_indices()
            .filter(|&index| keep(index))
            .filter_map(|index| self.graph.node_weight(index))
            .collect()
    }
}
