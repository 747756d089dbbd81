//! Subflow orchestration core for the cadence execution engine.
//!
//! This crate provides the execution/task-run data model together with
//! the two components that sit on either side of a subflow task's
//! lifecycle:
//!
//! - **Launcher**: resolves a target flow and builds a child execution
//!   seed when a parent task expands into a subflow.
//! - **Aggregator**: folds child completion events back into the parent
//!   task-run's iteration counters until the fan-out converges.

pub mod aggregator;
pub mod error;
pub mod launcher;
pub mod model;

pub use aggregator::{
    find_terminal_state, guess_state, ContextStorage, IterationAggregator, IterationCounters,
    TaskRunStore,
};
pub use error::{AggregatorError, LauncherError, OrchestrationError};
pub use launcher::{
    FlowLookup, FlowSummary, FlowTarget, InputReader, LaunchRequest, LaunchResult, ParentContext,
    ParentTask, SubflowLauncher,
};
pub use model::{
    find_label, Attempt, Execution, Label, State, StateHistory, StateHistoryError, TaskRun,
    TriggerBlock, CORRELATION_ID_LABEL_KEY, SYSTEM_LABEL_PREFIX,
};
