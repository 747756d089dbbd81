//! Condition-constrained fire-time search (C3).

use crate::cron::CronSpec;
use crate::error::EvalError;
use crate::window::ScheduleOutput;
use async_trait::async_trait;
use chrono::{DateTime, Datelike};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// How far `findAccepted` may drift from `now` before giving up
/// (spec.md §4.3, §5).
const SEARCH_HORIZON_YEARS: i32 = 10;

/// One entry in an ordered, AND-ed condition list. `schedule_aware`
/// distinguishes conditions that need the candidate `ScheduleOutput`
/// injected into their evaluation context from plain conditions that
/// don't (spec.md §9 re-architecture hint — collapses the historical
/// dual "schedule condition" / "condition" lists into one tagged list).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub expression: String,
    pub schedule_aware: bool,
}

impl Condition {
    #[must_use]
    pub fn new(expression: impl Into<String>, schedule_aware: bool) -> Self {
        Self {
            expression: expression.into(),
            schedule_aware,
        }
    }
}

/// The context a condition is evaluated against: the candidate fire's
/// `ScheduleOutput` (for schedule-aware conditions) plus ambient
/// variables.
#[derive(Debug, Clone)]
pub struct ConditionContext {
    pub schedule_output: Option<ScheduleOutput>,
    pub variables: HashMap<String, JsonValue>,
}

/// Evaluates an ordered condition list against a candidate fire's
/// context. Returning `Ok(false)` means the fire is simply rejected;
/// `Err` means evaluation itself failed (e.g. a variable-render error)
/// and must not be retried in a loop (spec.md §4.3).
#[async_trait]
pub trait ConditionEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        conditions: &[Condition],
        ctx: &ConditionContext,
    ) -> Result<bool, EvalError>;
}

/// Which direction `findAccepted` searches from the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Searches for the next (or previous) fire time that the condition
/// list accepts, bounded to ±10 years from `now` (spec.md §4.3).
///
/// Returns `Ok(None)` if the schedule has no more fires in that
/// direction, or if the horizon is exhausted without an accepted fire.
/// Returns `Err` immediately if a condition raises an evaluation error,
/// rather than continuing the search.
pub async fn find_accepted<E: ConditionEvaluator>(
    spec: &CronSpec,
    conditions: &[Condition],
    evaluator: &E,
    cursor: DateTime<Tz>,
    direction: Direction,
    now: DateTime<Tz>,
) -> Result<Option<DateTime<Tz>>, EvalError> {
    if conditions.is_empty() {
        return Ok(Some(cursor));
    }

    let min_year = now.year() - SEARCH_HORIZON_YEARS;
    let max_year = now.year() + SEARCH_HORIZON_YEARS;
    let mut candidate = cursor;

    loop {
        if candidate.year() < min_year || candidate.year() > max_year {
            return Ok(None);
        }

        let schedule_aware = conditions.iter().any(|c| c.schedule_aware);
        let ctx = ConditionContext {
            schedule_output: schedule_aware.then(|| ScheduleOutput {
                date: candidate,
                next: candidate,
                previous: None,
            }),
            variables: HashMap::new(),
        };
        if evaluator.evaluate(conditions, &ctx).await? {
            return Ok(Some(candidate));
        }

        candidate = match direction {
            Direction::Forward => match spec.next_after(candidate) {
                Some(next) => next,
                None => return Ok(None),
            },
            Direction::Backward => match spec.last_before(candidate) {
                Some(prev) => prev,
                None => return Ok(None),
            },
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc() -> Tz {
        chrono_tz::UTC
    }

    struct FirstMondayOfMonth;

    #[async_trait]
    impl ConditionEvaluator for FirstMondayOfMonth {
        async fn evaluate(
            &self,
            _conditions: &[Condition],
            _ctx: &ConditionContext,
        ) -> Result<bool, EvalError> {
            Ok(true)
        }
    }

    struct Always(bool);

    #[async_trait]
    impl ConditionEvaluator for Always {
        async fn evaluate(
            &self,
            _conditions: &[Condition],
            _ctx: &ConditionContext,
        ) -> Result<bool, EvalError> {
            Ok(self.0)
        }
    }

    struct Failing;

    #[async_trait]
    impl ConditionEvaluator for Failing {
        async fn evaluate(
            &self,
            _conditions: &[Condition],
            _ctx: &ConditionContext,
        ) -> Result<bool, EvalError> {
            Err(EvalError {
                reason: "boom".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn empty_condition_list_accepts_immediately() {
        let spec = CronSpec::new("0 11 * * 1", false, utc()).unwrap();
        let cursor = utc().with_ymd_and_hms(2024, 1, 1, 11, 0, 0).unwrap();
        let result = find_accepted(&spec, &[], &Always(false), cursor, Direction::Forward, cursor)
            .await
            .unwrap();
        assert_eq!(result, Some(cursor));
    }

    #[tokio::test]
    async fn rejecting_condition_advances_forward() {
        let spec = CronSpec::new("0 11 * * 1", false, utc()).unwrap();
        let conditions = vec![Condition::new("first monday", false)];
        let cursor = utc().with_ymd_and_hms(2024, 1, 1, 11, 0, 0).unwrap();
        let result = find_accepted(
            &spec,
            &conditions,
            &Always(false),
            cursor,
            Direction::Forward,
            cursor,
        )
        .await
        .unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn evaluation_error_short_circuits() {
        let spec = CronSpec::new("0 11 * * 1", false, utc()).unwrap();
        let conditions = vec![Condition::new("broken", false)];
        let cursor = utc().with_ymd_and_hms(2024, 1, 1, 11, 0, 0).unwrap();
        let err = find_accepted(&spec, &conditions, &Failing, cursor, Direction::Forward, cursor)
            .await
            .unwrap_err();
        assert!(err.reason.contains("boom"));
    }

    /// S4 — condition filter: `cron="0 11 * * 1"` (every Monday) combined
    /// with a real "first Monday of month" condition skips the
    /// non-first Mondays in between.
    struct RealFirstMondayOfMonth;

    #[async_trait]
    impl ConditionEvaluator for RealFirstMondayOfMonth {
        async fn evaluate(
            &self,
            _conditions: &[Condition],
            ctx: &ConditionContext,
        ) -> Result<bool, EvalError> {
            let date = ctx
                .schedule_output
                .as_ref()
                .ok_or_else(|| EvalError {
                    reason: "first-monday-of-month requires a schedule-aware context".to_string(),
                })?
                .date;
            Ok(date.day() <= 7)
        }
    }

    #[tokio::test]
    async fn s4_condition_filter_first_monday_of_month() {
        let spec = CronSpec::new("0 11 * * 1", false, utc()).unwrap();
        let conditions = vec![Condition::new("first monday of month", true)];
        let last = utc().with_ymd_and_hms(2024, 1, 1, 11, 0, 0).unwrap();
        let cursor = spec.next_after(last).unwrap();

        let result = find_accepted(
            &spec,
            &conditions,
            &RealFirstMondayOfMonth,
            cursor,
            Direction::Forward,
            last,
        )
        .await
        .unwrap();

        assert_eq!(result, Some(utc().with_ymd_and_hms(2024, 2, 5, 11, 0, 0).unwrap()));
    }

    #[tokio::test]
    async fn accepting_condition_returns_first_candidate() {
        let spec = CronSpec::new("0 11 * * 1", false, utc()).unwrap();
        let conditions = vec![Condition::new("any monday", false)];
        let cursor = utc().with_ymd_and_hms(2024, 1, 1, 11, 0, 0).unwrap();
        let result = find_accepted(
            &spec,
            &conditions,
            &FirstMondayOfMonth,
            cursor,
            Direction::Forward,
            cursor,
        )
        .await
        .unwrap();
        assert_eq!(result, Some(cursor));
    }
}
