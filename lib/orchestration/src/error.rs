//! Error types for the orchestration crate.
//!
//! - `LauncherError`: Failures resolving or constructing a subflow launch
//! - `AggregatorError`: Invariant violations in iteration aggregation
//! - `OrchestrationError`: High-level wrapper a caller can use when
//!   attaching context to one of the above

use cadence_core::{FlowId, TaskRunId};
use std::fmt;

/// Errors from `SubflowLauncher` (spec.md §4.5, §7).
///
/// `FlowNotFound`, `FlowDisabled`, and `InvalidFlow` are fatal per
/// spec.md §7: they surface to the caller as `IllegalState` and are never
/// retried automatically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LauncherError {
    /// The target flow could not be resolved by `(tenant, namespace, flow_id, revision)`.
    FlowNotFound {
        tenant_id: String,
        namespace: String,
        flow_id: FlowId,
    },
    /// The target flow exists but is disabled.
    FlowDisabled { flow_id: FlowId },
    /// The target flow exists but failed validation.
    InvalidFlow { flow_id: FlowId, reason: String },
    /// The external input reader rejected the supplied inputs.
    InputResolutionFailed { flow_id: FlowId, reason: String },
}

impl fmt::Display for LauncherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FlowNotFound {
                tenant_id,
                namespace,
                flow_id,
            } => write!(
                f,
                "flow not found: {flow_id} (tenant={tenant_id}, namespace={namespace})"
            ),
            Self::FlowDisabled { flow_id } => write!(f, "flow disabled: {flow_id}"),
            Self::InvalidFlow { flow_id, reason } => {
                write!(f, "invalid flow {flow_id}: {reason}")
            }
            Self::InputResolutionFailed { flow_id, reason } => {
                write!(f, "input resolution failed for flow {flow_id}: {reason}")
            }
        }
    }
}

impl std::error::Error for LauncherError {}

/// Errors from `IterationAggregator` (spec.md §4.6, §7).
///
/// These are all fatal invariant violations: the caller's event-dedup and
/// storage layers are expected to guarantee the preconditions that would
/// otherwise make these impossible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregatorError {
    /// No persisted parent task-run exists for the given ID.
    MissingParentTaskRun { task_run_id: TaskRunId },
    /// The persisted parent task-run has no recorded batch count.
    MissingBatchCount { task_run_id: TaskRunId },
    /// The persisted parent task-run was found but is already terminal —
    /// a redelivered event arrived after convergence.
    AlreadyTerminal { task_run_id: TaskRunId },
}

impl fmt::Display for AggregatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingParentTaskRun { task_run_id } => {
                write!(f, "no persisted parent task-run: {task_run_id}")
            }
            Self::MissingBatchCount { task_run_id } => {
                write!(
                    f,
                    "parent task-run {task_run_id} has no numberOfBatches output"
                )
            }
            Self::AlreadyTerminal { task_run_id } => {
                write!(
                    f,
                    "parent task-run {task_run_id} already terminal, redelivered event ignored"
                )
            }
        }
    }
}

impl std::error::Error for AggregatorError {}

/// High-level orchestration errors.
///
/// Use these to add context when wrapping lower-level errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestrationError {
    /// Subflow launch context (use as context wrapper).
    Launch { task_id: String },
    /// Iteration aggregation context (use as context wrapper).
    Aggregation { task_run_id: TaskRunId },
}

impl fmt::Display for OrchestrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Launch { task_id } => write!(f, "subflow launch failed for task {task_id}"),
            Self::Aggregation { task_run_id } => {
                write!(f, "iteration aggregation failed for task-run {task_run_id}")
            }
        }
    }
}

impl std::error::Error for OrchestrationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launcher_error_display() {
        let flow_id = FlowId::new();
        let err = LauncherError::FlowDisabled { flow_id };
        assert!(err.to_string().contains("flow disabled"));
    }

    #[test]
    fn aggregator_error_display() {
        let task_run_id = TaskRunId::new();
        let err = AggregatorError::MissingParentTaskRun { task_run_id };
        assert!(err.to_string().contains("no persisted parent task-run"));
    }

    #[test]
    fn orchestration_error_display() {
        let err = OrchestrationError::Launch {
            task_id: "spawn".to_string(),
        };
        assert!(err.to_string().contains("subflow launch failed"));
    }
}
