//! Top-level schedule trigger: combines C1-C3, backfill, and
//! missed-schedule recovery into a single `evaluate`/`nextEvaluationDate`
//! surface (C4).

use crate::collaborators::{RunContextLogger, VariableRenderer};
use crate::condition::{find_accepted, Condition, ConditionEvaluator, Direction};
use crate::cron::CronSpec;
use crate::error::EvalError;
use crate::window::{apply_late_delay, schedule_dates, ScheduleOutput};
use cadence_core::{ExecutionId, FlowId, TriggerId};
use cadence_orchestration::{
    find_label, Execution, Label, State, StateHistory, TriggerBlock, CORRELATION_ID_LABEL_KEY,
};
use chrono::{DateTime, Duration};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Catch-up policy applied by the surrounding scheduler loop when
/// replaying missed fires from a persisted `last.date` (spec.md §4.4).
/// The core only exposes the hook; the policy itself is the caller's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RecoverMissedSchedules {
    #[default]
    All,
    Last,
    None,
}

/// Historical backfill configuration: replays a closed date range before
/// reverting to live scheduling (spec.md §3 `Backfill`).
#[derive(Debug, Clone, PartialEq)]
pub struct Backfill {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub current_date: DateTime<Tz>,
    pub paused: bool,
    pub labels: Vec<Label>,
    pub inputs: HashMap<String, JsonValue>,
}

impl Backfill {
    #[must_use]
    pub fn new(start: DateTime<Tz>, end: DateTime<Tz>) -> Self {
        Self {
            start,
            current_date: start,
            end,
            paused: false,
            labels: Vec::new(),
            inputs: HashMap::new(),
        }
    }

    /// Advances the backfill cursor. Invariant: `start <= current_date`;
    /// once `current_date > end` the backfill is complete.
    pub fn advance(&mut self, to: DateTime<Tz>) {
        self.current_date = to;
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.current_date > self.end
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }
}

/// Read-only snapshot passed to each evaluation (spec.md §3
/// `TriggerContext`).
#[derive(Debug, Clone)]
pub struct TriggerContext {
    pub tenant_id: String,
    pub namespace: String,
    pub flow_id: FlowId,
    pub trigger_id: TriggerId,
    pub last_date: Option<DateTime<Tz>>,
    pub backfill: Option<Backfill>,
    /// System labels propagated from the triggering context (spec.md §4.4
    /// step 6), e.g. labels the surrounding scheduler stamps on every
    /// execution it emits regardless of trigger type.
    pub system_labels: Vec<Label>,
}

/// The instant the surrounding scheduler decided to evaluate at.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext {
    pub date: DateTime<Tz>,
}

/// The configuration surface of a schedule trigger (spec.md §6 table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleTrigger {
    pub spec: CronSpec,
    pub inputs: HashMap<String, JsonValue>,
    #[serde(
        serialize_with = "serialize_opt_duration_seconds",
        deserialize_with = "deserialize_opt_duration_seconds"
    )]
    pub late_maximum_delay: Option<Duration>,
    pub recover_missed_schedules: RecoverMissedSchedules,
    pub conditions: Vec<Condition>,
    pub stop_after: Vec<State>,
    /// Static labels defined on the trigger's own configuration (spec.md
    /// §4.4 step 6), applied last so they win over system/backfill labels
    /// with the same key.
    pub trigger_labels: Vec<Label>,
}

/// `chrono::Duration` has no serde support of its own; wraps it as whole
/// seconds, the same shape as the teacher's millisecond duration wrapper.
fn serialize_opt_duration_seconds<S: serde::Serializer>(
    duration: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    duration.map(Duration::num_seconds).serialize(serializer)
}

fn deserialize_opt_duration_seconds<'de, D: serde::Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Duration>, D::Error> {
    let seconds: Option<i64> = Option::deserialize(deserializer)?;
    Ok(seconds.map(Duration::seconds))
}

impl ScheduleTrigger {
    #[must_use]
    pub fn new(spec: CronSpec) -> Self {
        Self {
            spec,
            inputs: HashMap::new(),
            late_maximum_delay: None,
            recover_missed_schedules: RecoverMissedSchedules::default(),
            conditions: Vec::new(),
            stop_after: Vec::new(),
            trigger_labels: Vec::new(),
        }
    }

    /// Whether a terminal state reported for a child execution should
    /// cause the surrounding scheduler to disable this trigger. The
    /// core never disables itself; this is a read-only primitive for
    /// the caller (spec.md §6, SPEC_FULL §10).
    #[must_use]
    pub fn matches_stop_after(&self, state: State) -> bool {
        self.stop_after.contains(&state)
    }

    /// Determines the next wall-clock at which the scheduler should
    /// consider firing (spec.md §4.4 cases 1-3).
    ///
    /// When conditions are configured, case 2/3's "next" is the next
    /// *condition-true* fire, not merely the next cron fire: this awaits
    /// `find_accepted` over the anchor exactly like `evaluate` does. A
    /// condition-evaluation error here has no logger/caller to report to,
    /// so it collapses to "nothing accepted" and falls back to `now`,
    /// same as an exhausted search horizon.
    pub async fn next_evaluation_date<E: ConditionEvaluator>(
        &self,
        ctx: &TriggerContext,
        evaluator: &E,
        now: DateTime<Tz>,
    ) -> DateTime<Tz> {
        let anchor = match (&ctx.last_date, &ctx.backfill) {
            (None, None) => {
                return self.spec.next_after(now).unwrap_or(now);
            }
            (_, Some(backfill)) => backfill.current_date,
            (Some(last), None) => *last,
        };

        let raw_next = self.spec.next_after(anchor);
        let next = if self.conditions.is_empty() {
            raw_next
        } else {
            match raw_next {
                Some(candidate) => find_accepted(
                    &self.spec,
                    &self.conditions,
                    evaluator,
                    candidate,
                    Direction::Forward,
                    now,
                )
                .await
                .ok()
                .flatten(),
                None => None,
            }
        };

        let Some(mut next) = next else {
            return now;
        };

        if let Some(backfill) = &ctx.backfill {
            if next > backfill.end {
                return self.spec.next_after(now).unwrap_or(now);
            }
        } else if let Some(late_max) = self.late_maximum_delay {
            if let Some(output) = schedule_dates(&self.spec, next) {
                if let Some(skipped) = apply_late_delay(&self.spec, output, late_max, now) {
                    next = skipped.date;
                }
            }
        }

        next
    }

    /// Runs the full per-tick evaluation (spec.md §4.4 steps 1-8).
    ///
    /// Returns `Ok(None)` for a silent skip (paused, conditions false,
    /// nothing eligible yet), `Ok(Some(execution))` for a normal or
    /// synthetic-failed seed, and propagates nothing fatal: flow
    /// resolution failures are the executor's problem, not this
    /// trigger's.
    #[allow(clippy::too_many_arguments)]
    pub async fn evaluate<E, V>(
        &self,
        ctx: &TriggerContext,
        trig_ctx: &EvaluationContext,
        evaluator: &E,
        renderer: &V,
        logger: &dyn RunContextLogger,
        now: DateTime<Tz>,
    ) -> Option<Execution>
    where
        E: ConditionEvaluator,
        V: VariableRenderer,
    {
        if let Some(backfill) = &ctx.backfill {
            if backfill.paused {
                return None;
            }
        }

        let anchor = ctx
            .backfill
            .as_ref()
            .map_or(trig_ctx.date, |b| b.current_date);

        let output = schedule_dates(&self.spec, anchor)?;

        if output.date > now + Duration::seconds(1) {
            tracing::trace!("schedule trigger evaluated for a date more than 1s in the future");
            return None;
        }

        let mut output = output;
        if !self.conditions.is_empty() {
            let accepted = find_accepted(
                &self.spec,
                &self.conditions,
                evaluator,
                output.date,
                Direction::Forward,
                now,
            )
            .await;

            output = match accepted {
                Ok(Some(accepted_date)) => {
                    match self
                        .reproject_window(evaluator, accepted_date, output.next, now)
                        .await
                    {
                        Ok(reprojected) => reprojected,
                        Err(eval_err) => {
                            logger.warn(&format!(
                                "schedule condition evaluation failed: {}",
                                eval_err.reason
                            ));
                            return Some(self.failed_execution(ctx, output, now));
                        }
                    }
                }
                Ok(None) => return None,
                Err(eval_err) => {
                    logger.warn(&format!(
                        "schedule condition evaluation failed: {}",
                        eval_err.reason
                    ));
                    return Some(self.failed_execution(ctx, output, now));
                }
            };
        }

        match self.build_execution(ctx, output, renderer, now).await {
            Ok(execution) => Some(execution),
            Err(reason) => {
                logger.warn(&format!("schedule input render failed: {reason}"));
                Some(self.failed_execution(ctx, output, now))
            }
        }
    }

    /// Re-projects `previous`/`next` through the condition filter once
    /// `date` has been accepted, per spec.md §4.4 step 5 ("re-project
    /// previous/next through condition filter to produce condition-true
    /// triples"). Falls back to the raw, unconditioned cron neighbor when
    /// the filtered search finds nothing within the horizon.
    async fn reproject_window<E: ConditionEvaluator>(
        &self,
        evaluator: &E,
        accepted_date: DateTime<Tz>,
        raw_next: DateTime<Tz>,
        now: DateTime<Tz>,
    ) -> Result<ScheduleOutput, EvalError> {
        let next = match self.spec.next_after(accepted_date) {
            Some(candidate) => find_accepted(
                &self.spec,
                &self.conditions,
                evaluator,
                candidate,
                Direction::Forward,
                now,
            )
            .await?
            .unwrap_or(raw_next),
            None => raw_next,
        };

        let previous = match self.spec.last_before(accepted_date) {
            Some(candidate) => {
                find_accepted(
                    &self.spec,
                    &self.conditions,
                    evaluator,
                    candidate,
                    Direction::Backward,
                    now,
                )
                .await?
            }
            None => None,
        };

        Ok(ScheduleOutput {
            date: accepted_date,
            next,
            previous,
        })
    }

    async fn build_execution<V: VariableRenderer>(
        &self,
        ctx: &TriggerContext,
        output: ScheduleOutput,
        renderer: &V,
        now: DateTime<Tz>,
    ) -> Result<Execution, String> {
        let mut labels: Vec<Label> = ctx.system_labels.clone();

        let execution_id = ExecutionId::new();
        if find_label(&labels, CORRELATION_ID_LABEL_KEY).is_none() {
            labels.push(Label::new(CORRELATION_ID_LABEL_KEY, execution_id.to_string()));
        }

        if let Some(backfill) = &ctx.backfill {
            for label in &backfill.labels {
                labels.push(render_label(renderer, label).await?);
            }
        }

        labels.extend(self.trigger_labels.iter().cloned());

        let mut inputs = renderer.render_map(&self.inputs).await?;
        if let Some(backfill) = &ctx.backfill {
            let rendered_backfill_inputs = renderer.render_map(&backfill.inputs).await?;
            inputs.extend(rendered_backfill_inputs);
        }

        let mut variables = HashMap::new();
        let schedule_json = schedule_output_to_json(&output);
        variables.insert("schedule".to_string(), schedule_json.clone());
        variables.insert("trigger".to_string(), schedule_json);

        Ok(Execution {
            id: execution_id,
            tenant_id: ctx.tenant_id.clone(),
            namespace: ctx.namespace.clone(),
            flow_id: ctx.flow_id,
            flow_revision: 0,
            labels,
            inputs,
            trigger: TriggerBlock {
                id: ctx.trigger_id.to_string(),
                trigger_type: "io.cadence.Schedule".to_string(),
                variables,
            },
            schedule_date: Some(output.date.with_timezone(&chrono::Utc)),
            state: StateHistory::new(State::Created, now.with_timezone(&chrono::Utc)),
        })
    }

    fn failed_execution(
        &self,
        ctx: &TriggerContext,
        output: ScheduleOutput,
        now: DateTime<Tz>,
    ) -> Execution {
        let mut variables = HashMap::new();
        variables.insert("schedule".to_string(), schedule_output_to_json(&output));

        Execution {
            id: ExecutionId::new(),
            tenant_id: ctx.tenant_id.clone(),
            namespace: ctx.namespace.clone(),
            flow_id: ctx.flow_id,
            flow_revision: 0,
            labels: Vec::new(),
            inputs: HashMap::new(),
            trigger: TriggerBlock {
                id: ctx.trigger_id.to_string(),
                trigger_type: "io.cadence.Schedule".to_string(),
                variables,
            },
            schedule_date: Some(output.date.with_timezone(&chrono::Utc)),
            state: StateHistory::new(State::Failed, now.with_timezone(&chrono::Utc)),
        }
    }
}

/// Renders a single backfill label's value, preserving ordering (label
/// sets are rarely more than a handful of entries, so per-label rendering
/// over `render_map` keeps the original `Vec<Label>` order intact).
async fn render_label<V: VariableRenderer>(renderer: &V, label: &Label) -> Result<Label, String> {
    let rendered = renderer
        .render(&JsonValue::String(label.value.clone()))
        .await?;
    let value = match rendered {
        JsonValue::String(s) => s,
        other => other.to_string(),
    };
    Ok(Label::new(label.key.clone(), value))
}

fn schedule_output_to_json(output: &ScheduleOutput) -> JsonValue {
    let mut map = serde_json::Map::new();
    map.insert("date".to_string(), JsonValue::String(output.date.to_rfc3339()));
    map.insert("next".to_string(), JsonValue::String(output.next.to_rfc3339()));
    if let Some(previous) = output.previous {
        map.insert(
            "previous".to_string(),
            JsonValue::String(previous.to_rfc3339()),
        );
    }
    JsonValue::Object(map)
}
