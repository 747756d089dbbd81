//! Core domain types and utilities for the cadence execution engine.
//!
//! This crate provides the foundational types, error handling, and shared
//! identifier formats used by both the schedule-trigger and
//! subflow-orchestration crates.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ExecutionId, FlowId, ParseIdError, TaskRunId, TriggerId};
