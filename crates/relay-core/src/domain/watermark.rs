//! Run watermark: marker of the last fully successful scheduling cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp of the last cycle in which every batch committed.
///
/// Only the task source writes this (via `update_watermark`), and only after
/// an all-clean cycle; a partially failed cycle leaves it untouched so the
/// same work is retried in full on the next tick. Task sources read it to
/// compute "what changed since last run". Persistence format is the task
/// source's concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunWatermark {
    completed_at: DateTime<Utc>,
}

impl RunWatermark {
    pub fn new(completed_at: DateTime<Utc>) -> Self {
        Self { completed_at }
    }

    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    /// Has anything happened after this watermark?
    pub fn is_before(&self, instant: DateTime<Utc>) -> bool {
        self.completed_at < instant
    }
}
