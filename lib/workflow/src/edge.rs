//! Edge types for workflow graphs.
//!
//! An edge says that the target consumes the source's output. Multi-port
//! nodes name the ports involved; the engine itself ignores port names and
//! only hands them to handlers.

use crate::node::NodeId;
use serde::{Deserialize, Serialize};

/// A directed dependency between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// The upstream node.
    pub source: NodeId,
    /// The downstream node.
    pub target: NodeId,
    /// Output port on the source, if the source has several.
    #[serde(default, alias = "sourceHandle", skip_serializing_if = "Option::is_none")]
    pub source_port: Option<String>,
    /// Input port on the target, if the target has several.
    #[serde(default, alias = "targetHandle", skip_serializing_if = "Option::is_none")]
    pub target_port: Option<String>,
}

impl Edge {
    /// Creates an edge without port names.
    #[must_use]
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            source_port: None,
            target_port: None,
        }
    }

    /// Sets both port names.
    #[must_use]
    pub fn with_ports(
        mut self,
        source_port: impl Into<String>,
        target_port: impl Into<String>,
    ) -> Self {
        self.source_port = Some(source_port.into());
        self.target_port = Some(target_port.into());
        self
    }
}
