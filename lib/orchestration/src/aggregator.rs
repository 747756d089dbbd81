//! Iteration aggregation for fan-out subflow tasks (spec.md §4.6, C6).
//!
//! A parent task that spawns `numberOfBatches` independent child
//! executions needs its own terminal state computed from the terminal
//! states its children eventually report. This module folds one child
//! state-transition event at a time into the parent task-run's persisted
//! `iterations` counters until all children have terminated.

use crate::error::AggregatorError;
use crate::model::{Execution, State, TaskRun};
use async_trait::async_trait;
use cadence_core::TaskRunId;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Per-state counts of how many children currently occupy that state.
/// Keyed by `State::to_string()` for straightforward JSON round-tripping
/// through a task-run's `outputs` map.
pub type IterationCounters = HashMap<String, i64>;

/// Loads previously persisted task-runs by id.
#[async_trait]
pub trait TaskRunStore: Send + Sync {
    async fn load(&self, id: TaskRunId) -> Option<TaskRun>;
}

/// Resolves the base URI subflow outputs are stored under for a given
/// execution.
#[async_trait]
pub trait ContextStorage: Send + Sync {
    async fn context_base_uri(&self, execution: &Execution) -> String;
}

const ITERATIONS_KEY: &str = "iterations";
const NUMBER_OF_BATCHES_KEY: &str = "numberOfBatches";
const SUBFLOW_OUTPUTS_BASE_URI_KEY: &str = "subflowOutputsBaseUri";

/// The terminal states a child (or parent) task-run can converge to.
const TERMINAL_STATES: [State; 5] = [
    State::Failed,
    State::Killed,
    State::Warning,
    State::Success,
    State::Cancelled,
];

/// Picks the parent's terminal state from its children's terminal-state
/// counts, honoring `allowFailure`/`allowWarning` overrides (spec.md
/// §4.6 step 8).
#[must_use]
pub fn find_terminal_state(
    iterations: &IterationCounters,
    allow_failure: bool,
    allow_warning: bool,
) -> State {
    let count_of = |state: State| iterations.get(&state.to_string()).copied().unwrap_or(0);

    if count_of(State::Failed) > 0 {
        return if allow_failure {
            if allow_warning {
                State::Success
            } else {
                State::Warning
            }
        } else {
            State::Failed
        };
    }
    if count_of(State::Killed) > 0 {
        return State::Killed;
    }
    if count_of(State::Warning) > 0 {
        return if allow_warning {
            State::Success
        } else {
            State::Warning
        };
    }
    State::Success
}

/// Collapses a single child's outcome directly to a parent state, used
/// when a task has exactly one child rather than a fan-out
/// (spec.md §4.6, `guessState`).
#[must_use]
pub fn guess_state(
    child_state: State,
    transmit_failed: bool,
    allow_failure: bool,
    allow_warning: bool,
) -> State {
    let is_unhappy = matches!(
        child_state,
        State::Failed | State::Paused | State::Killed | State::Warning
    );
    if transmit_failed && is_unhappy {
        if child_state == State::Failed && allow_failure {
            return if allow_warning {
                State::Success
            } else {
                State::Warning
            };
        }
        if child_state == State::Warning && allow_warning {
            return State::Success;
        }
        return child_state;
    }
    State::Success
}

fn counters_from_outputs(outputs: &HashMap<String, JsonValue>) -> IterationCounters {
    outputs
        .get(ITERATIONS_KEY)
        .and_then(|value| value.as_object())
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_i64().map(|n| (k.clone(), n)))
                .collect()
        })
        .unwrap_or_default()
}

fn counters_to_json(counters: &IterationCounters) -> JsonValue {
    JsonValue::Object(
        counters
            .iter()
            .map(|(k, v)| (k.clone(), JsonValue::from(*v)))
            .collect(),
    )
}

/// Folds one child completion event into a parent task-run's aggregate
/// state.
pub struct IterationAggregator<S, C> {
    task_run_store: S,
    context_storage: C,
}

impl<S, C> IterationAggregator<S, C>
where
    S: TaskRunStore,
    C: ContextStorage,
{
    pub fn new(task_run_store: S, context_storage: C) -> Self {
        Self {
            task_run_store,
            context_storage,
        }
    }

    /// Runs the aggregation algorithm (spec.md §4.6 steps 1-9).
    #[tracing::instrument(skip(self, current_execution), fields(task_run_id = %incoming_task_run.id))]
    pub async fn aggregate(
        &self,
        incoming_task_run: &TaskRun,
        current_execution: &Execution,
        transmit_failed: bool,
        allow_failure: bool,
        allow_warning: bool,
        at: DateTime<Utc>,
    ) -> Result<TaskRun, AggregatorError> {
        let persisted = self
            .task_run_store
            .load(incoming_task_run.id)
            .await
            .ok_or(AggregatorError::MissingParentTaskRun {
                task_run_id: incoming_task_run.id,
            })?;

        let number_of_batches = persisted
            .outputs
            .get(NUMBER_OF_BATCHES_KEY)
            .and_then(JsonValue::as_i64)
            .ok_or(AggregatorError::MissingBatchCount {
                task_run_id: incoming_task_run.id,
            })?;

        let cur_state = incoming_task_run.current_state();
        let prev_state = {
            let entries = incoming_task_run.state.entries();
            if entries.len() > 1 {
                Some(entries[entries.len() - 2].0)
            } else {
                None
            }
        };

        let mut iterations = counters_from_outputs(&persisted.outputs);
        *iterations.entry(cur_state.to_string()).or_insert(0) += 1;

        if let Some(prev_state) = prev_state {
            if prev_state != cur_state {
                let entry = iterations
                    .entry(prev_state.to_string())
                    .or_insert(number_of_batches);
                *entry -= 1;
            }
        }

        let terminated: i64 = TERMINAL_STATES
            .iter()
            .map(|state| iterations.get(&state.to_string()).copied().unwrap_or(0))
            .sum();

        let mut parent = persisted;

        if terminated == number_of_batches {
            let mut terminal_state = find_terminal_state(&iterations, allow_failure, allow_warning);
            if !transmit_failed {
                terminal_state = State::Success;
            }
            tracing::debug!(
                task_run_id = %incoming_task_run.id,
                %terminal_state,
                "iteration fan-out converged"
            );

            parent.attempts.push(crate::model::Attempt {
                state: terminal_state,
                at,
            });
            parent
                .state
                .push(terminal_state, at)
                .map_err(|_| AggregatorError::AlreadyTerminal {
                    task_run_id: incoming_task_run.id,
                })?;

            let base_uri = self.context_storage.context_base_uri(current_execution).await;
            parent
                .outputs
                .insert(ITERATIONS_KEY.to_string(), counters_to_json(&iterations));
            parent.outputs.insert(
                NUMBER_OF_BATCHES_KEY.to_string(),
                JsonValue::from(number_of_batches),
            );
            parent.outputs.insert(
                SUBFLOW_OUTPUTS_BASE_URI_KEY.to_string(),
                JsonValue::String(base_uri),
            );
        } else {
            parent
                .outputs
                .insert(ITERATIONS_KEY.to_string(), counters_to_json(&iterations));
        }

        Ok(parent)
    }
}
