//! Node and workflow status state machines.
//!
//! Two independent transition tables. Nothing here stores state: the
//! snapshot owns the current statuses and the state manager consults these
//! tables before every change.

use crate::error::TransitionError;
use crate::node::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution status of a single node within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Waiting for predecessors.
    Idle,
    /// Every predecessor finished; queued for a wave.
    Ready,
    /// An attempt is in flight.
    Running,
    /// The last attempt failed and another one is scheduled.
    Retrying,
    /// Finished and wrote its output.
    Success,
    /// Finished without a usable output.
    Failed,
    /// Not attempted.
    Skipped,
    /// Not attempted because of an upstream failure.
    Blocked,
    /// Gave up because of a time limit.
    Timeout,
}

impl NodeStatus {
    /// Every node status, in table order.
    pub const ALL: [Self; 9] = [
        Self::Idle,
        Self::Ready,
        Self::Running,
        Self::Retrying,
        Self::Success,
        Self::Failed,
        Self::Skipped,
        Self::Blocked,
        Self::Timeout,
    ];

    /// Statuses reachable in one step from `self`.
    #[must_use]
    pub const fn allowed_transitions(self) -> &'static [Self] {
        match self {
            Self::Idle => &[
                Self::Ready,
                Self::Running,
                Self::Skipped,
                Self::Blocked,
                Self::Failed,
            ],
            Self::Ready => &[Self::Running, Self::Skipped, Self::Blocked, Self::Failed],
            Self::Running => &[Self::Success, Self::Failed, Self::Timeout, Self::Retrying],
            Self::Retrying => &[Self::Running, Self::Failed, Self::Timeout],
            Self::Success | Self::Failed | Self::Skipped | Self::Blocked | Self::Timeout => &[],
        }
    }

    /// Returns true if the table allows `self -> next`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Returns true if no further transition is possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Returns true for the outcomes that fail a workflow.
    #[must_use]
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::Timeout)
    }

    /// Returns true for terminal outcomes where the node never ran.
    #[must_use]
    pub fn is_not_run(self) -> bool {
        matches!(self, Self::Skipped | Self::Blocked)
    }

    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Retrying => "retrying",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Blocked => "blocked",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Snapshot created, nothing dispatched yet.
    Pending,
    /// Waves are being executed.
    Running,
    /// Suspended by the caller.
    Paused,
    /// Every node succeeded.
    Completed,
    /// No failures, but some nodes were not run.
    CompletedWithSkips,
    /// At least one node failed or timed out.
    Failed,
    /// Stopped by the caller.
    Cancelled,
    /// Stopped by the run deadline.
    Timeout,
}

impl WorkflowStatus {
    /// Every workflow status, in table order.
    pub const ALL: [Self; 8] = [
        Self::Pending,
        Self::Running,
        Self::Paused,
        Self::Completed,
        Self::CompletedWithSkips,
        Self::Failed,
        Self::Cancelled,
        Self::Timeout,
    ];

    /// Statuses reachable in one step from `self`.
    #[must_use]
    pub const fn allowed_transitions(self) -> &'static [Self] {
        match self {
            Self::Pending => &[Self::Running, Self::Cancelled],
            Self::Running => &[
                Self::Paused,
                Self::Completed,
                Self::CompletedWithSkips,
                Self::Failed,
                Self::Cancelled,
                Self::Timeout,
            ],
            Self::Paused => &[Self::Running, Self::Cancelled],
            Self::Completed
            | Self::CompletedWithSkips
            | Self::Failed
            | Self::Cancelled
            | Self::Timeout => &[],
        }
    }

    /// Returns true if the table allows `self -> next`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Returns true if no further transition is possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Derives the terminal status of a run from its final node statuses.
    ///
    /// Any `failed`/`timeout` node fails the run. Otherwise any node that was
    /// not run yields `completed_with_skips`, and a clean run is `completed`.
    #[must_use]
    pub fn derive(statuses: impl IntoIterator<Item = NodeStatus>) -> Self {
        let mut skipped = false;
        for status in statuses {
            if status.is_failure() {
                return Self::Failed;
            }
            skipped |= status.is_not_run();
        }
        if skipped {
            Self::CompletedWithSkips
        } else {
            Self::Completed
        }
    }

    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::CompletedWithSkips => "completed_with_skips",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validates a node transition.
///
/// # Errors
///
/// Returns [`TransitionError::IllegalNodeTransition`] if the table forbids it.
pub fn check_node_transition(
    node_id: &NodeId,
    from: NodeStatus,
    to: NodeStatus,
) -> Result<NodeStatus, TransitionError> {
    if from.can_transition_to(to) {
        Ok(to)
    } else {
        Err(TransitionError::IllegalNodeTransition {
            node_id: node_id.clone(),
            from,
            to,
        })
    }
}

/// Validates a workflow transition.
///
/// # Errors
///
/// Returns [`TransitionError::IllegalWorkflowTransition`] if the table
/// forbids it.
pub fn check_workflow_transition(
    from: WorkflowStatus,
    to: WorkflowStatus,
) -> Result<WorkflowStatus, TransitionError> {
    if from.can_transition_to(to) {
        Ok(to)
    } else {
        Err(TransitionError::IllegalWorkflowTransition { from, to })
    }
}
