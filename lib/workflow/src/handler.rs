//! Node handlers and the handler registry.
//!
//! A handler executes one node. It reads inbound values and the external
//! inputs bag through its [`NodeContext`] and must write exactly one output
//! per invocation through [`NodeContext::set_output`]. The engine wraps each
//! invocation with timeout, retry and cancellation; handlers only do the
//! work.
//!
//! Node kinds without a registered handler run through
//! [`PassThroughHandler`].

use crate::error::HandlerError;
use crate::node::{Node, NodeId, NodeKind};
use crate::snapshot::{Snapshot, SnapshotPatch};
use crate::state::ExecutionStateManager;
use crate::status::NodeStatus;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;

/// Executes nodes of one kind.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    /// Runs `node` once.
    ///
    /// Implementations write their result with [`NodeContext::set_output`];
    /// returning `Ok(())` without writing is a failure.
    async fn execute(&self, node: &Node, ctx: &NodeContext) -> Result<(), HandlerError>;
}

/// Adapts a synchronous closure into a [`NodeHandler`].
///
/// The closure returns the output value and the adapter writes it.
pub struct SyncHandler<F>(F);

impl<F> SyncHandler<F>
where
    F: Fn(&Node, &NodeContext) -> Result<JsonValue, HandlerError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> NodeHandler for SyncHandler<F>
where
    F: Fn(&Node, &NodeContext) -> Result<JsonValue, HandlerError> + Send + Sync,
{
    async fn execute(&self, node: &Node, ctx: &NodeContext) -> Result<(), HandlerError> {
        let value = (self.0)(node, ctx)?;
        ctx.set_output(value).await
    }
}

/// Copies inbound values through unchanged.
///
/// - no inbound edge: the node's entry in the inputs bag, or `null`
/// - one inbound edge: that value, `null` if the predecessor wrote nothing
/// - several inbound edges: an array in edge declaration order with `null`
///   for missing values
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughHandler;

#[async_trait]
impl NodeHandler for PassThroughHandler {
    async fn execute(&self, _node: &Node, ctx: &NodeContext) -> Result<(), HandlerError> {
        let value = match ctx.inbound() {
            [] => ctx.input().cloned().unwrap_or(JsonValue::Null),
            [single] => single.value.clone().unwrap_or(JsonValue::Null),
            many => JsonValue::Array(
                many.iter()
                    .map(|inbound| inbound.value.clone().unwrap_or(JsonValue::Null))
                    .collect(),
            ),
        };
        ctx.set_output(value).await
    }
}

/// Maps node kinds to handlers.
#[derive(Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<NodeKind, Arc<dyn NodeHandler>>,
    fallback: Arc<dyn NodeHandler>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: Arc::new(PassThroughHandler),
        }
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&str> = self.handlers.keys().map(NodeKind::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("HandlerRegistry")
            .field("kinds", &kinds)
            .finish_non_exhaustive()
    }
}

impl HandlerRegistry {
    /// Creates a registry where every kind passes through.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `kind`, replacing any previous one.
    pub fn register(&mut self, kind: impl Into<NodeKind>, handler: impl NodeHandler + 'static) {
        self.handlers.insert(kind.into(), Arc::new(handler));
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, kind: impl Into<NodeKind>, handler: impl NodeHandler + 'static) -> Self {
        self.register(kind, handler);
        self
    }

    /// Registers a synchronous closure for `kind`.
    #[must_use]
    pub fn with_fn<F>(self, kind: impl Into<NodeKind>, f: F) -> Self
    where
        F: Fn(&Node, &NodeContext) -> Result<JsonValue, HandlerError> + Send + Sync + 'static,
    {
        self.with(kind, SyncHandler::new(f))
    }

    /// Handler for `kind`, or the pass-through fallback.
    #[must_use]
    pub fn resolve(&self, kind: &NodeKind) -> Arc<dyn NodeHandler> {
        self.handlers
            .get(kind)
            .map_or_else(|| Arc::clone(&self.fallback), Arc::clone)
    }

    #[must_use]
    pub fn is_registered(&self, kind: &NodeKind) -> bool {
        self.handlers.contains_key(kind)
    }
}

/// The current output of one predecessor, as seen by a handler.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundValue {
    pub source: NodeId,
    pub source_port: Option<String>,
    pub target_port: Option<String>,
    /// `None` if the predecessor never wrote an output.
    pub value: Option<JsonValue>,
}

/// Everything a handler may touch during one invocation.
pub struct NodeContext {
    node_id: NodeId,
    attempt: u32,
    inbound: Arc<[InboundValue]>,
    inputs: Arc<BTreeMap<NodeId, JsonValue>>,
    state: Arc<ExecutionStateManager>,
    cancel: CancellationToken,
    written: AtomicBool,
}

impl std::fmt::Debug for NodeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeContext")
            .field("node_id", &self.node_id)
            .field("attempt", &self.attempt)
            .field("inbound", &self.inbound)
            .field("written", &self.has_written_output())
            .finish_non_exhaustive()
    }
}

impl NodeContext {
    /// Creates a context for the first attempt with no inbound values.
    #[must_use]
    pub fn new(node_id: NodeId, state: Arc<ExecutionStateManager>) -> Self {
        Self {
            node_id,
            attempt: 1,
            inbound: Arc::from(Vec::new()),
            inputs: Arc::new(BTreeMap::new()),
            state,
            cancel: CancellationToken::new(),
            written: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    #[must_use]
    pub fn with_inbound(mut self, inbound: Arc<[InboundValue]>) -> Self {
        self.inbound = inbound;
        self
    }

    #[must_use]
    pub fn with_inputs(mut self, inputs: Arc<BTreeMap<NodeId, JsonValue>>) -> Self {
        self.inputs = inputs;
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// 1-based attempt number.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Inbound values in edge declaration order.
    #[must_use]
    pub fn inbound(&self) -> &[InboundValue] {
        &self.inbound
    }

    /// Inbound values only, in edge declaration order.
    #[must_use]
    pub fn inbound_values(&self) -> Vec<Option<JsonValue>> {
        self.inbound.iter().map(|i| i.value.clone()).collect()
    }

    /// Value from the first edge coming from `source`.
    #[must_use]
    pub fn inbound_from(&self, source: &str) -> Option<&JsonValue> {
        self.inbound
            .iter()
            .find(|i| i.source.as_str() == source)
            .and_then(|i| i.value.as_ref())
    }

    /// Value arriving on the named target port.
    #[must_use]
    pub fn inbound_on_port(&self, port: &str) -> Option<&JsonValue> {
        self.inbound
            .iter()
            .find(|i| i.target_port.as_deref() == Some(port))
            .and_then(|i| i.value.as_ref())
    }

    /// This node's entry in the external inputs bag.
    #[must_use]
    pub fn input(&self) -> Option<&JsonValue> {
        self.inputs.get(&self.node_id)
    }

    /// The whole external inputs bag.
    #[must_use]
    pub fn inputs(&self) -> &BTreeMap<NodeId, JsonValue> {
        &self.inputs
    }

    /// Writes this invocation's output.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::OutputAlreadyWritten`] on a second call within
    /// the same invocation.
    pub async fn set_output(&self, value: JsonValue) -> Result<(), HandlerError> {
        if self.written.swap(true, Ordering::SeqCst) {
            return Err(HandlerError::OutputAlreadyWritten);
        }
        self.state
            .set_node_output(&self.node_id, value)
            .await
            .map_err(|e| HandlerError::failed(e.to_string()))
    }

    #[must_use]
    pub fn has_written_output(&self) -> bool {
        self.written.load(Ordering::SeqCst)
    }

    /// Merges handler metadata into the run snapshot.
    pub async fn checkpoint(&self, patch: SnapshotPatch) {
        self.state.checkpoint(patch).await;
    }

    /// Current status of any node in the run.
    #[must_use]
    pub fn status_of(&self, node_id: &str) -> Option<NodeStatus> {
        self.state.snapshot().status_of(node_id)
    }

    /// Current snapshot of the run.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.state.snapshot()
    }

    /// Workflow-wide cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
