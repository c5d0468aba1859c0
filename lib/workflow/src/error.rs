//! Error types for the workflow crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `GraphError`: graph construction and validation
//! - `TransitionError`: illegal status changes (contract violations)
//! - `HandlerError`: a single handler attempt failing
//! - `PersistError`: snapshot persistence hook failures
//! - `DocumentError`: loading a workflow document
//! - `EngineError`: run-level wrapper returned inside a `Report`

use crate::node::NodeId;
use crate::status::{NodeStatus, WorkflowStatus};
use std::fmt;

/// Errors from building or validating a workflow graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// A node was declared with an empty id.
    EmptyNodeId,
    /// Two nodes share the same id.
    DuplicateNode { node_id: NodeId },
    /// An edge references a node that is not in the graph.
    UnknownEdgeEndpoint {
        source: NodeId,
        target: NodeId,
        missing: NodeId,
    },
    /// The graph contains a cycle passing through the given node.
    CycleDetected { node_id: NodeId },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyNodeId => write!(f, "node declared with an empty id"),
            Self::DuplicateNode { node_id } => write!(f, "duplicate node id: {node_id}"),
            Self::UnknownEdgeEndpoint {
                source,
                target,
                missing,
            } => {
                write!(
                    f,
                    "edge {source} -> {target} references unknown node {missing}"
                )
            }
            Self::CycleDetected { node_id } => {
                write!(f, "graph contains a cycle through node {node_id}")
            }
        }
    }
}

impl std::error::Error for GraphError {}

/// An illegal status change was requested.
///
/// These are programming-contract violations and are never downgraded into
/// node failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The node status table does not allow `from -> to`.
    IllegalNodeTransition {
        node_id: NodeId,
        from: NodeStatus,
        to: NodeStatus,
    },
    /// The workflow status table does not allow `from -> to`.
    IllegalWorkflowTransition {
        from: WorkflowStatus,
        to: WorkflowStatus,
    },
    /// The node is not part of the run.
    UnknownNode { node_id: NodeId },
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IllegalNodeTransition { node_id, from, to } => {
                write!(f, "illegal status transition for node {node_id}: {from} -> {to}")
            }
            Self::IllegalWorkflowTransition { from, to } => {
                write!(f, "illegal workflow status transition: {from} -> {to}")
            }
            Self::UnknownNode { node_id } => {
                write!(f, "node {node_id} is not part of this run")
            }
        }
    }
}

impl std::error::Error for TransitionError {}

/// Failure of a single handler attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The handler reported a failure.
    Failed { message: String },
    /// The attempt did not finish within the node's timeout.
    Timeout { after_ms: u64 },
    /// The run was cancelled while the attempt was in flight.
    Cancelled,
    /// The handler wrote its output more than once in one attempt.
    OutputAlreadyWritten,
    /// The handler returned without writing an output.
    OutputNotWritten,
}

impl HandlerError {
    /// Convenience constructor for handler-reported failures.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Whether retrying the attempt could change the outcome.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed { message } => write!(f, "{message}"),
            Self::Timeout { after_ms } => write!(f, "timed out after {after_ms} ms"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::OutputAlreadyWritten => {
                write!(f, "handler wrote its output more than once")
            }
            Self::OutputNotWritten => write!(f, "handler finished without writing an output"),
        }
    }
}

impl std::error::Error for HandlerError {}

/// Failure reported by a snapshot persist hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistError {
    /// The hook could not store the snapshot.
    Failed { message: String },
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed { message } => write!(f, "snapshot persist failed: {message}"),
        }
    }
}

impl std::error::Error for PersistError {}

/// Errors from reading a workflow document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    /// The document could not be read.
    Io { path: String, reason: String },
    /// The document is not valid JSON for the expected shape.
    Malformed { reason: String },
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, reason } => write!(f, "cannot read workflow document {path}: {reason}"),
            Self::Malformed { reason } => write!(f, "malformed workflow document: {reason}"),
        }
    }
}

impl std::error::Error for DocumentError {}

/// Run-level errors returned by the engine.
///
/// Node failures are not errors at this level; they are recorded in the
/// snapshot and the run still returns a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The submitted graph failed validation.
    InvalidGraph(GraphError),
    /// A status transition violated the state machine.
    Transition(TransitionError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidGraph(e) => write!(f, "invalid workflow graph: {e}"),
            Self::Transition(e) => write!(f, "state machine violation: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<GraphError> for EngineError {
    fn from(e: GraphError) -> Self {
        Self::InvalidGraph(e)
    }
}

impl From<TransitionError> for EngineError {
    fn from(e: TransitionError) -> Self {
        Self::Transition(e)
    }
}
