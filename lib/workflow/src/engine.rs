//! Wave-based workflow engine.
//!
//! A run proceeds as follows:
//! 1. Validate the graph and build adjacency, inbound and indegree maps
//! 2. Create the snapshot (every node `idle`) and move the workflow to
//!    `running`
//! 3. Mark every indegree-0 node `ready`
//! 4. Pop up to `concurrency` ready nodes, run them concurrently and await
//!    the whole wave
//! 5. Release each finished node; successors whose indegree reaches zero
//!    become `ready` (or `skipped`/`blocked`, depending on the downstream
//!    policy)
//! 6. Repeat until nothing is ready, then derive the workflow status once
//!
//! Node failures never abort the run. Only graph validation errors and
//! state machine violations are returned as errors.

use crate::config::{DownstreamPolicy, EngineConfig};
use crate::dependencies::Dependencies;
use crate::edge::Edge;
use crate::error::{EngineError, HandlerError, TransitionError};
use crate::graph::WorkflowGraph;
use crate::handler::{HandlerRegistry, InboundValue, NodeContext, NodeHandler};
use crate::log::{ExecutionLog, LogEntry, LogKind};
use crate::node::{Node, NodeId};
use crate::snapshot::{Snapshot, SnapshotPatch};
use crate::state::{ExecutionStateManager, PersistHook};
use crate::status::{NodeStatus, WorkflowStatus};
use canvasflow_core::WorkflowRunId;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::{Instant, sleep, sleep_until, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

/// Input of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    /// External values keyed by node id, read by handlers.
    #[serde(default)]
    pub inputs: BTreeMap<NodeId, JsonValue>,
}

impl RunRequest {
    #[must_use]
    pub fn new(nodes: impl IntoIterator<Item = Node>, edges: impl IntoIterator<Item = Edge>) -> Self {
        Self {
            nodes: nodes.into_iter().collect(),
            edges: edges.into_iter().collect(),
            inputs: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_input(mut self, node_id: impl Into<NodeId>, value: JsonValue) -> Self {
        self.inputs.insert(node_id.into(), value);
        self
    }
}

/// Outcome of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub run_id: WorkflowRunId,
    pub workflow_status: WorkflowStatus,
    /// Last output of every node that wrote one.
    pub outputs_by_node: BTreeMap<NodeId, JsonValue>,
    /// Terminal and sink nodes, whatever their status; `None` if the node
    /// never wrote an output.
    pub final_outputs: BTreeMap<NodeId, Option<JsonValue>>,
    pub logs: Vec<LogEntry>,
    pub node_status: BTreeMap<NodeId, NodeStatus>,
    /// Number of waves dispatched.
    pub waves: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Final snapshot, including metadata.
    pub snapshot: Snapshot,
}

impl RunResult {
    #[must_use]
    pub fn status_of(&self, node_id: &str) -> Option<NodeStatus> {
        self.node_status.get(node_id).copied()
    }

    #[must_use]
    pub fn output_of(&self, node_id: &str) -> Option<&JsonValue> {
        self.outputs_by_node.get(node_id)
    }
}

/// Runs workflow graphs.
#[derive(Clone, Default)]
pub struct Engine {
    registry: Arc<HandlerRegistry>,
    config: EngineConfig,
    persist: Option<Arc<dyn PersistHook>>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("persist", &self.persist.is_some())
            .finish()
    }
}

impl Engine {
    #[must_use]
    pub fn new(registry: HandlerRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            config: EngineConfig::default(),
            persist: None,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Forwards every snapshot mutation of every run to `hook`.
    #[must_use]
    pub fn with_persist_hook(mut self, hook: Arc<dyn PersistHook>) -> Self {
        self.persist = Some(hook);
        self
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Runs a workflow to completion.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidGraph`] if the graph fails validation and
    /// [`EngineError::Transition`] if a status change violates the state
    /// machine. Node failures are reported in the result, not as errors.
    pub async fn run(&self, request: RunRequest) -> canvasflow_core::Result<RunResult, EngineError> {
        self.run_with_cancellation(request, CancellationToken::new())
            .await
    }

    /// Runs a workflow that can be stopped through `cancel`.
    ///
    /// Cancelling interrupts in-flight handlers, dispatches no further wave
    /// and marks every node that never ran as `skipped`; the workflow ends
    /// `cancelled`.
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run).
    pub async fn run_with_cancellation(
        &self,
        request: RunRequest,
        cancel: CancellationToken,
    ) -> canvasflow_core::Result<RunResult, EngineError> {
        let graph =
            WorkflowGraph::from_parts(request.nodes, request.edges).map_err(EngineError::from)?;
        let run = Run::new(self, graph, request.inputs, &cancel);
        let span = info_span!(
            "workflow_run",
            run_id = %run.run_id,
            nodes = run.graph.node_count(),
            edges = run.graph.edge_count()
        );
        let result = run.execute().instrument(span).await.map_err(EngineError::from)?;
        Ok(result)
    }
}

/// Why dispatching stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Halt {
    Cancelled,
    Deadline,
}

impl fmt::Display for Halt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "workflow cancelled"),
            Self::Deadline => write!(f, "run deadline exceeded"),
        }
    }
}

/// State of one run.
struct Run {
    run_id: WorkflowRunId,
    graph: WorkflowGraph,
    registry: Arc<HandlerRegistry>,
    config: EngineConfig,
    state: Arc<ExecutionStateManager>,
    log: ExecutionLog,
    inputs: Arc<BTreeMap<NodeId, JsonValue>>,
    /// Child of the caller's token; also cancelled when the deadline fires.
    token: CancellationToken,
    deadline_hit: AtomicBool,
    /// Set when a node attempt was cut short by the token.
    interrupted: AtomicBool,
}

impl Run {
    fn new(
        engine: &Engine,
        graph: WorkflowGraph,
        inputs: BTreeMap<NodeId, JsonValue>,
        cancel: &CancellationToken,
    ) -> Self {
        let run_id = WorkflowRunId::new();
        let snapshot = Snapshot::new(run_id, graph.nodes().map(|node| node.id.clone()));
        let mut state = ExecutionStateManager::new(snapshot);
        if let Some(hook) = &engine.persist {
            state = state.with_persist_hook(Arc::clone(hook));
        }

        Self {
            run_id,
            graph,
            registry: Arc::clone(&engine.registry),
            config: engine.config.clone(),
            state: Arc::new(state),
            log: ExecutionLog::new(),
            inputs: Arc::new(inputs),
            token: cancel.child_token(),
            deadline_hit: AtomicBool::new(false),
            interrupted: AtomicBool::new(false),
        }
    }

    async fn execute(self) -> Result<RunResult, TransitionError> {
        info!("workflow run started");
        let mut deps = Dependencies::from_graph(&self.graph);

        self.state
            .checkpoint(
                SnapshotPatch::new()
                    .with_metadata("run_id", self.run_id.to_string())
                    .with_metadata("concurrency", self.config.wave_size())
                    .with_metadata("downstream_policy", self.config.downstream_policy.as_str()),
            )
            .await;
        self.state.set_workflow_status(WorkflowStatus::Running).await?;

        let (waves, halt) = self.drive(&mut deps).await?;

        if let Some(reason) = halt {
            info!(%reason, "workflow run stopped early");
            self.skip_unfinished(&deps, reason).await?;
        }

        let snapshot = self.state.snapshot();
        debug_assert!(snapshot.all_nodes_terminal(), "run finalized with unfinished nodes");
        let final_status = match halt {
            Some(Halt::Deadline) => WorkflowStatus::Timeout,
            Some(Halt::Cancelled) => WorkflowStatus::Cancelled,
            None => WorkflowStatus::derive(snapshot.node_status.values().copied()),
        };
        self.state.set_workflow_status(final_status).await?;

        info!(status = %final_status, waves, "workflow run finished");
        Ok(self.result(waves))
    }

    /// Dispatches waves until nothing is ready or the run is halted.
    async fn drive(
        &self,
        deps: &mut Dependencies,
    ) -> Result<(usize, Option<Halt>), TransitionError> {
        let wave_size = self.config.wave_size();
        let deadline = self.config.run_timeout().map(|limit| Instant::now() + limit);

        let mut ready = VecDeque::new();
        for root in deps.roots() {
            self.state.set_node_status(root, NodeStatus::Ready).await?;
            ready.push_back(root.clone());
        }

        let mut waves = 0;
        while !ready.is_empty() {
            if let Some(reason) = self.halted(deadline) {
                return Ok((waves, Some(reason)));
            }

            let take = wave_size.min(ready.len());
            let wave: Vec<NodeId> = ready.drain(..take).collect();
            waves += 1;
            debug!(wave = waves, size = wave.len(), "dispatching wave");

            let outcomes = self.run_wave(&wave, deadline).await;
            for (node_id, outcome) in wave.iter().zip(outcomes) {
                let status = outcome?;
                debug!(node_id = %node_id, %status, "node finished");
                self.promote(deps, node_id.clone(), &mut ready).await?;
            }
        }

        // The queue drained. Only a wave that was cut short stops the run;
        // a cancel or deadline arriving after the last node finished does not.
        let halt = if self.deadline_hit.load(Ordering::SeqCst) {
            Some(Halt::Deadline)
        } else if self.interrupted.load(Ordering::SeqCst) {
            Some(Halt::Cancelled)
        } else {
            None
        };
        debug_assert!(deps.is_drained() || halt.is_some());
        Ok((waves, halt))
    }

    async fn run_wave(
        &self,
        wave: &[NodeId],
        deadline: Option<Instant>,
    ) -> Vec<Result<NodeStatus, TransitionError>> {
        let all = join_all(wave.iter().map(|node_id| self.execute_node(node_id)));
        tokio::pin!(all);

        let Some(at) = deadline else {
            return all.await;
        };
        tokio::select! {
            outcomes = &mut all => outcomes,
            () = sleep_until(at) => {
                warn!("run deadline reached with nodes in flight");
                self.deadline_hit.store(true, Ordering::SeqCst);
                self.token.cancel();
                all.await
            }
        }
    }

    fn halted(&self, deadline: Option<Instant>) -> Option<Halt> {
        if let Some(at) = deadline
            && Instant::now() >= at
        {
            self.deadline_hit.store(true, Ordering::SeqCst);
            self.token.cancel();
        }
        if self.deadline_hit.load(Ordering::SeqCst) {
            Some(Halt::Deadline)
        } else if self.token.is_cancelled() {
            Some(Halt::Cancelled)
        } else {
            None
        }
    }

    /// Releases a finished node and queues the successors it unblocks.
    ///
    /// Successors that the downstream policy refuses to run are finished on
    /// the spot and released in turn.
    async fn promote(
        &self,
        deps: &mut Dependencies,
        finished: NodeId,
        ready: &mut VecDeque<NodeId>,
    ) -> Result<(), TransitionError> {
        let mut released = VecDeque::from([finished]);

        while let Some(done) = released.pop_front() {
            for next in deps.release(done.as_str()) {
                self.state.set_node_status(&next, NodeStatus::Ready).await?;

                let refused = match self.config.downstream_policy {
                    DownstreamPolicy::AttemptAnyway => None,
                    DownstreamPolicy::Skip => Some(NodeStatus::Skipped),
                    DownstreamPolicy::Block => Some(NodeStatus::Blocked),
                };
                let upstream = self.unsuccessful_predecessor(deps, next.as_str());

                match (refused, upstream) {
                    (Some(status), Some((upstream_id, upstream_status))) => {
                        self.state.set_node_status(&next, status).await?;
                        let node = self.node(&next)?;
                        self.record(
                            LogKind::Error,
                            node,
                            format!("{status}: upstream node {upstream_id} ended {upstream_status}"),
                        );
                        debug!(node_id = %next, %status, upstream = %upstream_id, "node not run");
                        released.push_back(next);
                    }
                    _ => ready.push_back(next),
                }
            }
        }
        Ok(())
    }

    fn unsuccessful_predecessor(
        &self,
        deps: &Dependencies,
        node_id: &str,
    ) -> Option<(NodeId, NodeStatus)> {
        let snapshot = self.state.snapshot();
        deps.predecessors(node_id).iter().find_map(|upstream| {
            let status = snapshot.status_of(upstream.as_str())?;
            (status != NodeStatus::Success).then(|| (upstream.clone(), status))
        })
    }

    /// Moves every node that never ran to `skipped`.
    async fn skip_unfinished(
        &self,
        deps: &Dependencies,
        reason: Halt,
    ) -> Result<(), TransitionError> {
        let snapshot = self.state.snapshot();
        for node_id in deps.unreleased() {
            if matches!(
                snapshot.status_of(node_id.as_str()),
                Some(NodeStatus::Idle | NodeStatus::Ready)
            ) {
                self.state.set_node_status(&node_id, NodeStatus::Skipped).await?;
                let node = self.node(&node_id)?;
                self.record(LogKind::Error, node, format!("not run: {reason}"));
            }
        }
        Ok(())
    }

    /// Per-node wrapper: status bookkeeping, timeout, retry and logging
    /// around the handler. Returns the node's terminal status.
    async fn execute_node(&self, node_id: &NodeId) -> Result<NodeStatus, TransitionError> {
        let node = self.node(node_id)?;
        self.state.set_node_status(node_id, NodeStatus::Running).await?;
        self.record(LogKind::Start, node, format!("{} started", node.kind));

        let handler = self.registry.resolve(&node.kind);
        let inbound = self.inbound_values(node_id);
        let max_attempts = node.retries().saturating_add(1);
        let mut attempt = 1;

        loop {
            let outcome = self.attempt(node, handler.as_ref(), &inbound, attempt).await;

            let error = match outcome {
                Ok(()) => {
                    self.state.set_node_status(node_id, NodeStatus::Success).await?;
                    self.record(LogKind::Success, node, format!("{} completed", node.kind));
                    return Ok(NodeStatus::Success);
                }
                Err(error) => error,
            };

            if attempt < max_attempts && error.is_retryable() && !self.token.is_cancelled() {
                warn!(node_id = %node_id, attempt, max_attempts, %error, "attempt failed; retrying");
                self.state.set_node_status(node_id, NodeStatus::Retrying).await?;
                self.backoff(attempt).await;
                self.state.set_node_status(node_id, NodeStatus::Running).await?;
                attempt += 1;
                continue;
            }

            if error == HandlerError::Cancelled {
                self.interrupted.store(true, Ordering::SeqCst);
            }
            let status = if error == HandlerError::Cancelled && self.deadline_hit.load(Ordering::SeqCst)
            {
                NodeStatus::Timeout
            } else {
                NodeStatus::Failed
            };
            warn!(node_id = %node_id, attempt, %status, %error, "node failed");
            self.state.set_node_status(node_id, status).await?;
            self.record(LogKind::Error, node, error.to_string());
            return Ok(status);
        }
    }

    /// One handler invocation, raced against the node timeout and the run
    /// cancellation token.
    async fn attempt(
        &self,
        node: &Node,
        handler: &dyn NodeHandler,
        inbound: &Arc<[InboundValue]>,
        attempt: u32,
    ) -> Result<(), HandlerError> {
        if self.token.is_cancelled() {
            return Err(HandlerError::Cancelled);
        }

        let ctx = NodeContext::new(node.id.clone(), Arc::clone(&self.state))
            .with_attempt(attempt)
            .with_inbound(Arc::clone(inbound))
            .with_inputs(Arc::clone(&self.inputs))
            .with_cancellation(self.token.clone());

        let result = tokio::select! {
            biased;
            () = self.token.cancelled() => Err(HandlerError::Cancelled),
            result = with_timeout(node.timeout(), handler.execute(node, &ctx)) => result,
        };

        match result {
            Ok(()) if !ctx.has_written_output() => Err(HandlerError::OutputNotWritten),
            other => other,
        }
    }

    async fn backoff(&self, attempt: u32) {
        let delay = self.config.retry_backoff.delay_for(attempt);
        if delay.is_zero() {
            return;
        }
        tokio::select! {
            () = sleep(delay) => {}
            () = self.token.cancelled() => {}
        }
    }

    /// Current outputs of direct predecessors, in edge declaration order.
    fn inbound_values(&self, node_id: &NodeId) -> Arc<[InboundValue]> {
        let snapshot = self.state.snapshot();
        self.graph
            .predecessors(node_id.as_str())
            .into_iter()
            .map(|(_, edge)| InboundValue {
                source: edge.source.clone(),
                source_port: edge.source_port.clone(),
                target_port: edge.target_port.clone(),
                value: snapshot.output_of(edge.source.as_str()).cloned(),
            })
            .collect()
    }

    fn node(&self, node_id: &NodeId) -> Result<&Node, TransitionError> {
        self.graph
            .get_node(node_id.as_str())
            .ok_or_else(|| TransitionError::UnknownNode {
                node_id: node_id.clone(),
            })
    }

    fn record(&self, kind: LogKind, node: &Node, message: impl Into<String>) {
        self.log
            .push(LogEntry::new(kind, node.id.clone(), &node.kind, message));
    }

    fn result(&self, waves: usize) -> RunResult {
        let snapshot = self.state.snapshot();
        let final_outputs = self
            .graph
            .output_nodes()
            .into_iter()
            .map(|node| {
                (
                    node.id.clone(),
                    snapshot.output_of(node.id.as_str()).cloned(),
                )
            })
            .collect();

        RunResult {
            run_id: self.run_id,
            workflow_status: snapshot.workflow_status,
            outputs_by_node: snapshot.node_outputs.clone(),
            final_outputs,
            logs: self.log.entries(),
            node_status: snapshot.node_status.clone(),
            waves,
            started_at: snapshot.started_at,
            finished_at: Utc::now(),
            snapshot: Snapshot::clone(&snapshot),
        }
    }
}

async fn with_timeout(
    limit: Option<Duration>,
    call: impl Future<Output = Result<(), HandlerError>>,
) -> Result<(), HandlerError> {
    let Some(limit) = limit else {
        return call.await;
    };
    timeout(limit, call).await.unwrap_or_else(|_elapsed| {
        Err(HandlerError::Timeout {
            after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        })
    })
}
