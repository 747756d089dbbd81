//! Subflow launching (spec.md §4.5, component C5).
//!
//! Given a parent execution about to expand a subflow task, resolves the
//! target flow, builds the child's label set and trigger block, and hands
//! back an `Execution` seed. The launcher never persists anything itself;
//! that is the caller's job.

use crate::error::LauncherError;
use crate::model::{
    Execution, Label, State, StateHistory, TaskRun, TriggerBlock, CORRELATION_ID_LABEL_KEY,
    SYSTEM_LABEL_PREFIX,
};
use async_trait::async_trait;
use cadence_core::{ExecutionId, FlowId};
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Summary of a flow definition, as returned by `FlowLookup`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowSummary {
    pub id: FlowId,
    pub tenant_id: String,
    pub namespace: String,
    pub revision: u32,
    pub disabled: bool,
    pub invalid_reason: Option<String>,
}

/// Resolves a target flow by tenant/namespace/id/revision, with the
/// caller's tenant/namespace/flow available for access-scope checks.
#[async_trait]
pub trait FlowLookup: Send + Sync {
    async fn find(
        &self,
        tenant_id: &str,
        namespace: &str,
        flow_id: FlowId,
        revision: Option<u32>,
        caller_tenant_id: &str,
        caller_namespace: &str,
        caller_flow_id: FlowId,
    ) -> Option<FlowSummary>;
}

/// Validates and fills in defaults for the supplied raw inputs against a
/// target flow's declared input schema.
#[async_trait]
pub trait InputReader: Send + Sync {
    async fn resolve(
        &self,
        flow: &FlowSummary,
        execution: &Execution,
        raw_inputs: &HashMap<String, JsonValue>,
    ) -> Result<HashMap<String, JsonValue>, String>;
}

/// The parent execution context a subflow task launches from.
#[derive(Debug, Clone, PartialEq)]
pub struct ParentContext {
    pub tenant_id: String,
    pub namespace: String,
}

/// Identifies the task within the parent flow that is expanding into a
/// subflow, mirrored onto the child's `TriggerBlock`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentTask {
    pub id: String,
    pub task_type: String,
}

/// The flow the subflow task targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowTarget {
    pub flow_id: FlowId,
    pub revision: Option<u32>,
}

/// A fully-formed request to launch a subflow.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub parent_ctx: ParentContext,
    pub parent_execution_id: ExecutionId,
    pub parent_labels: Vec<Label>,
    pub parent_task: ParentTask,
    pub parent_task_run: TaskRun,
    pub target: FlowTarget,
    pub inputs: HashMap<String, JsonValue>,
    pub caller_labels: Vec<Label>,
    pub schedule_date: Option<DateTime<Utc>>,
}

/// The outcome of a successful launch: the running parent task-run and the
/// seed for the new child execution.
#[derive(Debug, Clone)]
pub struct LaunchResult {
    pub parent_task_run: TaskRun,
    pub child_execution: Execution,
}

/// Builds the child's label set: system-prefixed parent labels, a
/// correlation id (defaulting to the parent execution id), then
/// caller-supplied labels last so they win ties (spec.md §4.5).
fn build_child_labels(
    parent_labels: &[Label],
    parent_execution_id: ExecutionId,
    caller_labels: &[Label],
) -> Vec<Label> {
    let mut labels: Vec<Label> = parent_labels
        .iter()
        .filter(|label| label.key.starts_with(SYSTEM_LABEL_PREFIX))
        .cloned()
        .collect();

    if !labels.iter().any(|label| label.key == CORRELATION_ID_LABEL_KEY) {
        labels.push(Label::new(
            CORRELATION_ID_LABEL_KEY,
            parent_execution_id.to_string(),
        ));
    }

    labels.extend(caller_labels.iter().cloned());
    labels
}

/// Launches a subflow execution on behalf of a parent task.
pub struct SubflowLauncher<L, I> {
    flow_lookup: L,
    input_reader: I,
}

impl<L, I> SubflowLauncher<L, I>
where
    L: FlowLookup,
    I: InputReader,
{
    pub fn new(flow_lookup: L, input_reader: I) -> Self {
        Self {
            flow_lookup,
            input_reader,
        }
    }

    /// Resolves the target flow, validates inputs, and builds the child
    /// execution seed. Returns the parent task-run transitioned to
    /// `Running` alongside the child seed.
    #[tracing::instrument(skip(self, request), fields(flow_id = %request.target.flow_id))]
    pub async fn launch(
        &self,
        request: LaunchRequest,
        now: DateTime<Utc>,
    ) -> Result<LaunchResult, LauncherError> {
        let flow = self
            .flow_lookup
            .find(
                &request.parent_ctx.tenant_id,
                &request.parent_ctx.namespace,
                request.target.flow_id,
                request.target.revision,
                &request.parent_ctx.tenant_id,
                &request.parent_ctx.namespace,
                request.target.flow_id,
            )
            .await
            .ok_or_else(|| LauncherError::FlowNotFound {
                tenant_id: request.parent_ctx.tenant_id.clone(),
                namespace: request.parent_ctx.namespace.clone(),
                flow_id: request.target.flow_id,
            })?;

        if flow.disabled {
            tracing::warn!(flow_id = %flow.id, "refusing to launch disabled flow");
            return Err(LauncherError::FlowDisabled { flow_id: flow.id });
        }
        if let Some(reason) = flow.invalid_reason.clone() {
            tracing::warn!(flow_id = %flow.id, %reason, "refusing to launch invalid flow");
            return Err(LauncherError::InvalidFlow {
                flow_id: flow.id,
                reason,
            });
        }

        let child_id = ExecutionId::new();
        let labels = build_child_labels(
            &request.parent_labels,
            request.parent_execution_id,
            &request.caller_labels,
        );

        let trigger = TriggerBlock {
            id: request.parent_task.id.clone(),
            trigger_type: request.parent_task.task_type.clone(),
            variables: HashMap::from([
                (
                    "executionId".to_string(),
                    JsonValue::String(request.parent_execution_id.to_string()),
                ),
                (
                    "namespace".to_string(),
                    JsonValue::String(request.parent_ctx.namespace.clone()),
                ),
                (
                    "flowId".to_string(),
                    JsonValue::String(flow.id.to_string()),
                ),
                (
                    "flowRevision".to_string(),
                    JsonValue::Number(flow.revision.into()),
                ),
            ]),
        };

        let child_seed = Execution {
            id: child_id,
            tenant_id: flow.tenant_id.clone(),
            namespace: flow.namespace.clone(),
            flow_id: flow.id,
            flow_revision: flow.revision,
            labels,
            inputs: HashMap::new(),
            trigger,
            schedule_date: request.schedule_date,
            state: StateHistory::new(State::Created, now),
        };

        let resolved_inputs = self
            .input_reader
            .resolve(&flow, &child_seed, &request.inputs)
            .await
            .map_err(|reason| LauncherError::InputResolutionFailed {
                flow_id: flow.id,
                reason,
            })?;

        let mut child_execution = child_seed;
        child_execution.inputs = resolved_inputs;

        let mut parent_task_run = request.parent_task_run;
        parent_task_run
            .state
            .push(State::Running, now)
            .map_err(|_| LauncherError::InvalidFlow {
                flow_id: flow.id,
                reason: "parent task-run already terminal".to_string(),
            })?;

        Ok(LaunchResult {
            parent_task_run,
            child_execution,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::TaskRunId;

    struct StubFlowLookup {
        summary: Option<FlowSummary>,
    }

    #[async_trait]
    impl FlowLookup for StubFlowLookup {
        async fn find(
            &self,
            _tenant_id: &str,
            _namespace: &str,
            _flow_id: FlowId,
            _revision: Option<u32>,
            _caller_tenant_id: &str,
            _caller_namespace: &str,
            _caller_flow_id: FlowId,
        ) -> Option<FlowSummary> {
            self.summary.clone()
        }
    }

    struct PassthroughInputReader;

    #[async_trait]
    impl InputReader for PassthroughInputReader {
        async fn resolve(
            &self,
            _flow: &FlowSummary,
            _execution: &Execution,
            raw_inputs: &HashMap<String, JsonValue>,
        ) -> Result<HashMap<String, JsonValue>, String> {
            Ok(raw_inputs.clone())
        }
    }

    fn parent_task_run() -> TaskRun {
        TaskRun {
            id: TaskRunId::new(),
            task_id: "spawn".to_string(),
            iteration: None,
            state: StateHistory::new(State::Created, Utc::now()),
            outputs: HashMap::new(),
            attempts: Vec::new(),
        }
    }

    fn launch_request(target: FlowId) -> LaunchRequest {
        LaunchRequest {
            parent_ctx: ParentContext {
                tenant_id: "tenant-a".to_string(),
                namespace: "prod".to_string(),
            },
            parent_execution_id: ExecutionId::new(),
            parent_labels: vec![
                Label::new("system.owner", "scheduler"),
                Label::new("env", "prod"),
            ],
            parent_task: ParentTask {
                id: "spawn".to_string(),
                task_type: "io.cadence.Subflow".to_string(),
            },
            parent_task_run: parent_task_run(),
            target: FlowTarget {
                flow_id: target,
                revision: None,
            },
            inputs: HashMap::new(),
            caller_labels: vec![Label::new("batch", "7")],
            schedule_date: None,
        }
    }

    #[tokio::test]
    async fn flow_not_found_is_fatal() {
        let launcher = SubflowLauncher::new(StubFlowLookup { summary: None }, PassthroughInputReader);
        let err = launcher
            .launch(launch_request(FlowId::new()), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::FlowNotFound { .. }));
    }

    #[tokio::test]
    async fn disabled_flow_is_fatal() {
        let flow_id = FlowId::new();
        let launcher = SubflowLauncher::new(
            StubFlowLookup {
                summary: Some(FlowSummary {
                    id: flow_id,
                    tenant_id: "tenant-a".to_string(),
                    namespace: "prod".to_string(),
                    revision: 1,
                    disabled: true,
                    invalid_reason: None,
                }),
            },
            PassthroughInputReader,
        );
        let err = launcher
            .launch(launch_request(flow_id), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::FlowDisabled { .. }));
    }

    #[tokio::test]
    async fn labels_keep_system_prefix_then_append_caller_labels() {
        let flow_id = FlowId::new();
        let launcher = SubflowLauncher::new(
            StubFlowLookup {
                summary: Some(FlowSummary {
                    id: flow_id,
                    tenant_id: "tenant-a".to_string(),
                    namespace: "prod".to_string(),
                    revision: 1,
                    disabled: false,
                    invalid_reason: None,
                }),
            },
            PassthroughInputReader,
        );
        let result = launcher
            .launch(launch_request(flow_id), Utc::now())
            .await
            .unwrap();

        let labels = &result.child_execution.labels;
        assert!(labels.iter().any(|l| l.key == "system.owner"));
        assert!(!labels.iter().any(|l| l.key == "env"));
        assert!(labels.iter().any(|l| l.key == CORRELATION_ID_LABEL_KEY));
        assert_eq!(labels.last().unwrap().key, "batch");
        assert_eq!(result.parent_task_run.current_state(), State::Running);
    }
}
