//! Error types for the schedule crate.
//!
//! - `ScheduleError`: Cron parsing and evaluation failures (construction-time)
//! - `EvalError`: Condition-evaluation failures raised mid-search
//! - `TriggerError`: High-level wrapper a caller can use when attaching
//!   context to one of the above

use cadence_core::TriggerId;
use std::fmt;

/// Errors from cron parsing and window computation.
///
/// `InvalidCronExpression` is a construction-time failure: it aborts
/// configuration load rather than surfacing per-evaluation (spec.md §7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// The cron expression did not parse under the configured field arity.
    InvalidCronExpression { expression: String, reason: String },
    /// The configured timezone id is not a recognized IANA zone.
    InvalidTimezone { timezone: String },
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCronExpression { expression, reason } => {
                write!(f, "invalid cron expression '{expression}': {reason}")
            }
            Self::InvalidTimezone { timezone } => {
                write!(f, "invalid timezone: {timezone}")
            }
        }
    }
}

impl std::error::Error for ScheduleError {}

/// Raised by a `ConditionEvaluator` when a condition cannot be evaluated
/// (e.g. a variable-rendering failure), as opposed to evaluating to
/// `false`. Per spec.md §4.3, this short-circuits the forward/backward
/// search rather than looping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalError {
    pub reason: String,
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "condition evaluation failed: {}", self.reason)
    }
}

impl std::error::Error for EvalError {}

/// High-level trigger errors.
///
/// Use these to add context when wrapping lower-level errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerError {
    /// Cron/window evaluation context (use as context wrapper).
    Evaluation { trigger_id: TriggerId },
    /// Condition evaluation context (use as context wrapper).
    ConditionEvaluation { trigger_id: TriggerId },
}

impl fmt::Display for TriggerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Evaluation { trigger_id } => {
                write!(f, "schedule evaluation failed for trigger {trigger_id}")
            }
            Self::ConditionEvaluation { trigger_id } => {
                write!(
                    f,
                    "condition evaluation failed for trigger {trigger_id}"
                )
            }
        }
    }
}

impl std::error::Error for TriggerError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_error_display() {
        let err = ScheduleError::InvalidCronExpression {
            expression: "invalid".to_string(),
            reason: "expected 5 parts".to_string(),
        };
        assert!(err.to_string().contains("invalid"));
        assert!(err.to_string().contains("5 parts"));
    }

    #[test]
    fn eval_error_display() {
        let err = EvalError {
            reason: "variable not found".to_string(),
        };
        assert!(err.to_string().contains("variable not found"));
    }

    #[test]
    fn trigger_error_display() {
        let id = TriggerId::new();
        let err = TriggerError::Evaluation { trigger_id: id };
        assert!(err.to_string().contains("schedule evaluation failed"));
    }
}
