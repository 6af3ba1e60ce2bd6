//! Periodic driver of the update pipeline.

mod service;

pub use service::{Scheduler, SchedulerConfig, SchedulerStatus};
