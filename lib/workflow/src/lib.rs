//! Workflow execution core for canvasflow.
//!
//! This crate runs user-authored workflow graphs:
//!
//! - **Graph Model**: petgraph-backed DAG of typed nodes and edges, with
//!   validation (duplicates, dangling edges, cycles)
//! - **State Machine**: legal transitions for node and workflow statuses
//! - **State Manager**: single writer of the run snapshot, with an optional
//!   persist hook
//! - **Handlers**: async handler trait, registry by node kind, pass-through
//!   fallback
//! - **Engine**: dependency-ordered waves with bounded concurrency, per-node
//!   timeout and retry, downstream policy, cancellation and run deadline

pub mod config;
pub mod dependencies;
pub mod document;
pub mod edge;
pub mod engine;
pub mod error;
pub mod graph;
pub mod handler;
pub mod log;
pub mod node;
pub mod snapshot;
pub mod state;
pub mod status;

pub use config::{DownstreamPolicy, EngineConfig, RetryBackoff};
pub use dependencies::Dependencies;
pub use document::WorkflowDocument;
pub use edge::Edge;
pub use engine::{Engine, RunRequest, RunResult};
pub use error::{
    DocumentError, EngineError, GraphError, HandlerError, PersistError, TransitionError,
};
pub use graph::WorkflowGraph;
pub use handler::{
    HandlerRegistry, InboundValue, NodeContext, NodeHandler, PassThroughHandler, SyncHandler,
};
pub use log::{ExecutionLog, LogEntry, LogKind};
pub use node::{Node, NodeId, NodeKind};
pub use snapshot::{Snapshot, SnapshotPatch};
pub use state::{ExecutionStateManager, PersistHook};
pub use status::{NodeStatus, WorkflowStatus};
