//! Execution state manager.
//!
//! The manager is the only writer of a run's [`Snapshot`]. Every status
//! change goes through the transition tables in [`crate::status`]; outputs
//! and checkpoints are copy-on-write updates of the shared snapshot.
//!
//! Concurrency: the snapshot lives behind a mutex as an `Arc`. A mutation
//! locks, clones the snapshot only if a reader still holds the previous
//! version (`Arc::make_mut`), applies the change and unlocks. The persist
//! hook runs after the lock is released.

use crate::error::{PersistError, TransitionError};
use crate::node::NodeId;
use crate::snapshot::{Snapshot, SnapshotPatch};
use crate::status::{NodeStatus, WorkflowStatus, check_node_transition, check_workflow_transition};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{trace, warn};

/// Receives every new snapshot version.
///
/// Failures are logged by the manager and never abort the run.
#[async_trait]
pub trait PersistHook: Send + Sync {
    async fn persist(&self, snapshot: Arc<Snapshot>) -> Result<(), PersistError>;
}

/// Sole owner of a run's snapshot.
pub struct ExecutionStateManager {
    snapshot: Mutex<Arc<Snapshot>>,
    persist: Option<Arc<dyn PersistHook>>,
}

impl std::fmt::Debug for ExecutionStateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionStateManager")
            .field("snapshot", &self.snapshot())
            .field("persist", &self.persist.is_some())
            .finish()
    }
}

impl ExecutionStateManager {
    #[must_use]
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Mutex::new(Arc::new(snapshot)),
            persist: None,
        }
    }

    /// Forwards every mutation to `hook`.
    #[must_use]
    pub fn with_persist_hook(mut self, hook: Arc<dyn PersistHook>) -> Self {
        self.persist = Some(hook);
        self
    }

    /// Current snapshot version.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Changes the workflow status. Returns the previous status.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::IllegalWorkflowTransition`] if the table
    /// forbids the change; the snapshot is left untouched.
    pub async fn set_workflow_status(
        &self,
        to: WorkflowStatus,
    ) -> Result<WorkflowStatus, TransitionError> {
        let (from, snapshot) = self.mutate(|snapshot| {
            let from = snapshot.workflow_status;
            check_workflow_transition(from, to)?;
            snapshot.workflow_status = to;
            Ok(from)
        })?;
        trace!(%from, %to, "workflow status changed");
        self.persist(snapshot).await;
        Ok(from)
    }

    /// Changes one node's status. Returns the previous status.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::UnknownNode`] if the node is not part of
    /// the run, or [`TransitionError::IllegalNodeTransition`] if the table
    /// forbids the change.
    pub async fn set_node_status(
        &self,
        node_id: &NodeId,
        to: NodeStatus,
    ) -> Result<NodeStatus, TransitionError> {
        let (from, snapshot) = self.mutate(|snapshot| {
            let from = known_status(snapshot, node_id)?;
            check_node_transition(node_id, from, to)?;
            snapshot.node_status.insert(node_id.clone(), to);
            Ok(from)
        })?;
        trace!(node_id = %node_id, %from, %to, "node status changed");
        self.persist(snapshot).await;
        Ok(from)
    }

    /// Stores a node's output, replacing any earlier value.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::UnknownNode`] if the node is not part of
    /// the run.
    pub async fn set_node_output(
        &self,
        node_id: &NodeId,
        value: JsonValue,
    ) -> Result<(), TransitionError> {
        let ((), snapshot) = self.mutate(|snapshot| {
            known_status(snapshot, node_id)?;
            snapshot.node_outputs.insert(node_id.clone(), value);
            Ok(())
        })?;
        self.persist(snapshot).await;
        Ok(())
    }

    /// Merges a partial update into the snapshot. An empty patch is not a
    /// mutation: the revision stays put and the persist hook is not called.
    pub async fn checkpoint(&self, patch: SnapshotPatch) {
        if patch.is_empty() {
            return;
        }
        let result: Result<((), Arc<Snapshot>), Infallible> = self.mutate(|snapshot| {
            snapshot.apply(patch);
            Ok(())
        });
        let Ok(((), snapshot)) = result;
        self.persist(snapshot).await;
    }

    /// Applies `change` under the lock and bumps the revision if it succeeds.
    ///
    /// `change` must validate before writing so that an error leaves the
    /// snapshot as it was.
    fn mutate<T, E>(
        &self,
        change: impl FnOnce(&mut Snapshot) -> Result<T, E>,
    ) -> Result<(T, Arc<Snapshot>), E> {
        let mut guard = self.snapshot.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = Arc::make_mut(&mut guard);
        let value = change(snapshot)?;
        snapshot.touch();
        Ok((value, Arc::clone(&guard)))
    }

    async fn persist(&self, snapshot: Arc<Snapshot>) {
        let Some(hook) = &self.persist else {
            return;
        };
        let revision = snapshot.revision;
        if let Err(error) = hook.persist(snapshot).await {
            warn!(%error, revision, "failed to persist snapshot; continuing");
        }
    }
}

fn known_status(snapshot: &Snapshot, node_id: &NodeId) -> Result<NodeStatus, TransitionError> {
    snapshot
        .status_of(node_id.as_str())
        .ok_or_else(|| TransitionError::UnknownNode {
            node_id: node_id.clone(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvasflow_core::WorkflowRunId;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manager(ids: &[&str]) -> ExecutionStateManager {
        ExecutionStateManager::new(Snapshot::new(
            WorkflowRunId::new(),
            ids.iter().map(|id| NodeId::from(*id)),
        ))
    }

    struct CountingHook {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl PersistHook for CountingHook {
        async fn persist(&self, _snapshot: Arc<Snapshot>) -> Result<(), PersistError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(PersistError::Failed {
                    message: "disk full".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn legal_node_transitions_are_applied() {
        let state = manager(&["a"]);
        let id = NodeId::from("a");

        let previous = state.set_node_status(&id, NodeStatus::Ready).await.expect("legal");
        assert_eq!(previous, NodeStatus::Idle);
        state.set_node_status(&id, NodeStatus::Running).await.expect("legal");
        state.set_node_status(&id, NodeStatus::Success).await.expect("legal");

        assert_eq!(state.snapshot().status_of("a"), Some(NodeStatus::Success));
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected_and_leaves_snapshot_unchanged() {
        let state = manager(&["a"]);
        let id = NodeId::from("a");
        state.set_node_status(&id, NodeStatus::Running).await.expect("legal");
        state.set_node_status(&id, NodeStatus::Success).await.expect("legal");
        let before = state.snapshot();

        let err = state
            .set_node_status(&id, NodeStatus::Running)
            .await
            .unwrap_err();

        assert!(matches!(err, TransitionError::IllegalNodeTransition { .. }));
        let after = state.snapshot();
        assert_eq!(after.status_of("a"), Some(NodeStatus::Success));
        assert_eq!(after.revision, before.revision);
    }

    #[tokio::test]
    async fn empty_checkpoint_is_not_a_mutation() {
        let hook = Arc::new(CountingHook {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let state = manager(&["a"]).with_persist_hook(hook.clone());

        state.checkpoint(SnapshotPatch::new()).await;
        assert_eq!(state.snapshot().revision, 0);
        assert_eq!(hook.calls.load(Ordering::SeqCst), 0);

        state
            .checkpoint(SnapshotPatch::new().with_metadata("stage", "draft"))
            .await;
        assert_eq!(state.snapshot().revision, 1);
        assert_eq!(hook.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_node_is_rejected() {
        let state = manager(&["a"]);
        let err = state
            .set_node_output(&NodeId::from("ghost"), json!(1))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TransitionError::UnknownNode {
                node_id: NodeId::from("ghost")
            }
        );
    }

    #[tokio::test]
    async fn readers_keep_their_version() {
        let state = manager(&["a"]);
        let old = state.snapshot();

        state
            .set_node_output(&NodeId::from("a"), json!({"text": "hi"}))
            .await
            .expect("known node");

        assert!(old.output_of("a").is_none());
        assert_eq!(state.snapshot().output_of("a"), Some(&json!({"text": "hi"})));
        assert!(state.snapshot().revision > old.revision);
    }

    #[tokio::test]
    async fn workflow_status_uses_its_own_table() {
        let state = manager(&["a"]);
        assert!(state.set_workflow_status(WorkflowStatus::Completed).await.is_err());
        state
            .set_workflow_status(WorkflowStatus::Running)
            .await
            .expect("legal");
        state
            .set_workflow_status(WorkflowStatus::Failed)
            .await
            .expect("legal");
        assert_eq!(state.snapshot().workflow_status, WorkflowStatus::Failed);
    }

    #[tokio::test]
    async fn checkpoint_merges_metadata() {
        let state = manager(&[]);
        state
            .checkpoint(SnapshotPatch::new().with_metadata("tokens", 42))
            .await;
        assert_eq!(state.snapshot().metadata.get("tokens"), Some(&json!(42)));
    }

    #[tokio::test]
    async fn persist_hook_sees_every_mutation() {
        let hook = Arc::new(CountingHook {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let state = manager(&["a"]).with_persist_hook(hook.clone());

        state
            .set_workflow_status(WorkflowStatus::Running)
            .await
            .expect("legal");
        state
            .set_node_status(&NodeId::from("a"), NodeStatus::Ready)
            .await
            .expect("legal");
        state
            .checkpoint(SnapshotPatch::new().with_metadata("stage", "ready"))
            .await;

        assert_eq!(hook.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn persist_failure_does_not_fail_the_mutation() {
        let hook = Arc::new(CountingHook {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let state = manager(&["a"]).with_persist_hook(hook.clone());

        let result = state
            .set_node_status(&NodeId::from("a"), NodeStatus::Ready)
            .await;

        assert!(result.is_ok());
        assert_eq!(hook.calls.load(Ordering::SeqCst), 1);
        assert_eq!(state.snapshot().status_of("a"), Some(NodeStatus::Ready));
    }

    #[tokio::test]
    async fn rejected_mutation_is_not_persisted() {
        let hook = Arc::new(CountingHook {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let state = manager(&["a"]).with_persist_hook(hook.clone());

        let _ = state
            .set_node_status(&NodeId::from("a"), NodeStatus::Success)
            .await;

        assert_eq!(hook.calls.load(Ordering::SeqCst), 0);
    }
}
