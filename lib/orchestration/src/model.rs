//! Shared execution/task-run data model.
//!
//! These types are produced by the schedule-trigger crate (as the seed of
//! a new `Execution`) and consumed/extended by the subflow launcher and
//! iteration aggregator in this crate.

use cadence_core::{ExecutionId, FlowId, TaskRunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;

/// Prefix reserved for system-propagated labels (spec.md §4.5).
pub const SYSTEM_LABEL_PREFIX: &str = "system.";

/// Label key used to carry the correlation ID across parent/child executions.
pub const CORRELATION_ID_LABEL_KEY: &str = "system.correlationId";

/// A single label. Represented as an ordered list element rather than a
/// map entry: the label set may contain duplicate keys, and the last
/// matching entry wins (spec.md §9 re-architecture hint).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub key: String,
    pub value: String,
}

impl Label {
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Looks up the last label with the given key, matching the ordered-list,
/// last-write-wins semantics of the label set.
#[must_use]
pub fn find_label<'a>(labels: &'a [Label], key: &str) -> Option<&'a Label> {
    labels.iter().rev().find(|label| label.key == key)
}

/// The lifecycle state of an execution or task-run (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    Created,
    Running,
    Paused,
    Killed,
    Warning,
    Failed,
    Success,
    Cancelled,
}

impl State {
    /// The terminal set T = {SUCCESS, FAILED, KILLED, WARNING, CANCELLED}.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Success | Self::Failed | Self::Killed | Self::Warning | Self::Cancelled
        )
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "CREATED",
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
            Self::Killed => "KILLED",
            Self::Warning => "WARNING",
            Self::Failed => "FAILED",
            Self::Success => "SUCCESS",
            Self::Cancelled => "CANCELLED",
        };
        write!(f, "{name}")
    }
}

/// An ordered sequence of `(state, at)` transitions. The current state is
/// always the last element; a terminal state can never be followed by a
/// non-terminal one (spec.md §3 invariant).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateHistory(Vec<(State, DateTime<Utc>)>);

impl StateHistory {
    #[must_use]
    pub fn new(initial: State, at: DateTime<Utc>) -> Self {
        Self(vec![(initial, at)])
    }

    /// The current (most recent) state.
    #[must_use]
    pub fn current(&self) -> State {
        self.0
            .last()
            .expect("state history always has at least one entry")
            .0
    }

    /// The state immediately preceding the current one, if any.
    #[must_use]
    pub fn previous(&self) -> Option<State> {
        if self.0.len() > 1 {
            Some(self.0[self.0.len() - 2].0)
        } else {
            None
        }
    }

    /// Appends a new state transition. Fails if the current state is
    /// terminal, since a terminal state cannot be followed by anything.
    pub fn push(&mut self, state: State, at: DateTime<Utc>) -> Result<(), StateHistoryError> {
        let from = self.current();
        if from.is_terminal() {
            return Err(StateHistoryError::TerminalStateTransition { from, to: state });
        }
        self.0.push((state, at));
        Ok(())
    }

    #[must_use]
    pub fn entries(&self) -> &[(State, DateTime<Utc>)] {
        &self.0
    }
}

/// Raised when a caller attempts to push a new state onto a history whose
/// current state is already terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateHistoryError {
    pub from: State,
    pub to: State,
}

impl fmt::Display for StateHistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cannot transition from terminal state {} to {}",
            self.from, self.to
        )
    }
}

impl std::error::Error for StateHistoryError {}

/// The block attached to an execution describing what triggered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerBlock {
    pub id: String,
    #[serde(rename = "type")]
    pub trigger_type: String,
    pub variables: HashMap<String, JsonValue>,
}

/// A seed for a new flow execution (spec.md §3 `Execution`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub tenant_id: String,
    pub namespace: String,
    pub flow_id: FlowId,
    pub flow_revision: u32,
    pub labels: Vec<Label>,
    pub inputs: HashMap<String, JsonValue>,
    pub trigger: TriggerBlock,
    pub schedule_date: Option<DateTime<Utc>>,
    pub state: StateHistory,
}

/// A single attempt recorded against a task-run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub state: State,
    pub at: DateTime<Utc>,
}

/// One run of one task inside an execution (spec.md §3 `TaskRun`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRun {
    pub id: TaskRunId,
    pub task_id: String,
    pub iteration: Option<u32>,
    pub state: StateHistory,
    pub outputs: HashMap<String, JsonValue>,
    pub attempts: Vec<Attempt>,
}

impl TaskRun {
    #[must_use]
    pub fn current_state(&self) -> State {
        self.state.current()
    }

    #[must_use]
    pub fn previous_state(&self) -> Option<State> {
        self.state.previous()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_terminal_set() {
        assert!(State::Success.is_terminal());
        assert!(State::Failed.is_terminal());
        assert!(State::Killed.is_terminal());
        assert!(State::Warning.is_terminal());
        assert!(State::Cancelled.is_terminal());
        assert!(!State::Created.is_terminal());
        assert!(!State::Running.is_terminal());
        assert!(!State::Paused.is_terminal());
    }

    #[test]
    fn state_history_tracks_current_and_previous() {
        let t0 = Utc::now();
        let mut history = StateHistory::new(State::Created, t0);
        assert_eq!(history.current(), State::Created);
        assert!(history.previous().is_none());

        history.push(State::Running, t0).unwrap();
        assert_eq!(history.current(), State::Running);
        assert_eq!(history.previous(), Some(State::Created));
    }

    #[test]
    fn state_history_rejects_transition_past_terminal() {
        let t0 = Utc::now();
        let mut history = StateHistory::new(State::Running, t0);
        history.push(State::Success, t0).unwrap();

        let err = history.push(State::Running, t0).unwrap_err();
        assert_eq!(err.from, State::Success);
        assert_eq!(err.to, State::Running);
    }

    #[test]
    fn label_lookup_takes_last_match() {
        let labels = vec![
            Label::new("system.correlationId", "first"),
            Label::new("env", "prod"),
            Label::new("system.correlationId", "second"),
        ];
        assert_eq!(
            find_label(&labels, CORRELATION_ID_LABEL_KEY).map(|l| l.value.as_str()),
            Some("second")
        );
    }
}
