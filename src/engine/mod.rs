//! Scheduling engine — per-asset rescore orchestration.

pub mod scheduler;

pub use scheduler::{FailureOutcome, RescoreScheduler, SchedulerConfig};
