//! Cron-based schedule trigger evaluation for the cadence execution engine.
//!
//! This crate provides:
//!
//! - **CronEvaluator**: cron expression parsing and next/previous fire computation
//! - **ScheduleWindow**: `(date, previous, next)` triples and late-delay skipping
//! - **ConditionFilter**: condition-constrained fire-time search
//! - **ScheduleTrigger**: the top-level trigger combining all of the above with
//!   backfill and missed-schedule recovery

pub mod collaborators;
pub mod condition;
pub mod cron;
pub mod error;
pub mod trigger;
pub mod window;

pub use collaborators::{RunContextLogger, TracingRunContextLogger, VariableRenderer};
pub use condition::{find_accepted, Condition, ConditionContext, ConditionEvaluator, Direction};
pub use cron::CronSpec;
pub use error::{EvalError, ScheduleError, TriggerError};
pub use trigger::{
    Backfill, EvaluationContext, RecoverMissedSchedules, ScheduleTrigger, TriggerContext,
};
pub use window::{apply_late_delay, schedule_dates, ScheduleOutput};
