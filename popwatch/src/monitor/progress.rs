//! Progress record of the update pipeline.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Lifecycle of an update run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UpdateStatus {
    Idle,
    Running,
    Completed,
    Failed,
}

impl UpdateStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Snapshot of the current or most recent update run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateProgress {
    pub run_id: Option<Uuid>,
    pub status: UpdateStatus,
    /// 0 to 100, never decreasing within a run.
    pub percentage: f64,
    pub message: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Default for UpdateProgress {
    fn default() -> Self {
        Self {
            run_id: None,
            status: UpdateStatus::Idle,
            percentage: 0.0,
            message: "Idle".to_string(),
            started_at: None,
            finished_at: None,
        }
    }
}

/// Shared, lock-guarded progress record.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    inner: Mutex<UpdateProgress>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> UpdateProgress {
        self.inner.lock().clone()
    }

    /// Start a new run at 0%.
    pub fn begin(&self, run_id: Uuid, message: impl Into<String>) {
        *self.inner.lock() = UpdateProgress {
            run_id: Some(run_id),
            status: UpdateStatus::Running,
            percentage: 0.0,
            message: message.into(),
            started_at: Some(Utc::now()),
            finished_at: None,
        };
    }

    /// Move the running percentage forward. Lower values keep the current
    /// percentage but still update the message.
    pub fn advance(&self, percentage: f64, message: impl Into<String>) {
        let mut progress = self.inner.lock();
        if progress.status != UpdateStatus::Running {
            return;
        }
        progress.percentage = progress.percentage.max(percentage.clamp(0.0, 100.0));
        progress.message = message.into();
    }

    pub fn complete(&self, message: impl Into<String>) {
        let mut progress = self.inner.lock();
        progress.status = UpdateStatus::Completed;
        progress.percentage = 100.0;
        progress.message = message.into();
        progress.finished_at = Some(Utc::now());
    }

    /// Mark the run failed, keeping the percentage reached so far.
    pub fn fail(&self, message: impl Into<String>) {
        let mut progress = self.inner.lock();
        progress.status = UpdateStatus::Failed;
        progress.message = message.into();
        progress.finished_at = Some(Utc::now());
    }
}
