//! Cycle results as plain values.
//!
//! A batch failing is an expected outcome, not an exceptional condition, so
//! `run_cycle` reports it through these types and reserves `Err` for failures
//! that invalidate the whole cycle (fetch/hook errors).

use std::fmt;
use std::time::Duration;

use crate::domain::CycleId;

/// Why a batch was aborted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchFailure {
    /// The batch's task logic failed.
    Task(String),
    /// The batch was forcibly terminated at the configured timeout.
    Timeout(Duration),
    /// Tasks succeeded but `commit()` failed.
    Commit(String),
    /// `begin()` failed; the batch never ran.
    Begin(String),
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchFailure::Task(e) => write!(f, "task logic failed: {e}"),
            BatchFailure::Timeout(limit) => write!(f, "terminated after {limit:?}"),
            BatchFailure::Commit(e) => write!(f, "commit failed: {e}"),
            BatchFailure::Begin(e) => write!(f, "could not begin transaction: {e}"),
        }
    }
}

/// Terminal state of one batch within a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Committed,
    Aborted(BatchFailure),
}

impl BatchOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, BatchOutcome::Committed)
    }
}

/// One batch's entry in the cycle report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub label: String,
    pub outcome: BatchOutcome,
}

/// Result of one `run_cycle` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleReport {
    /// `should_run()` said no; nothing was fetched or begun.
    Skipped,
    /// The cycle ran. `all_ok` iff every batch committed (the watermark
    /// advanced exactly in that case).
    Completed {
        cycle_id: CycleId,
        all_ok: bool,
        batches: Vec<BatchReport>,
    },
}

impl CycleReport {
    /// True for a skipped cycle or a cycle in which every batch committed.
    pub fn is_clean(&self) -> bool {
        match self {
            CycleReport::Skipped => true,
            CycleReport::Completed { all_ok, .. } => *all_ok,
        }
    }

    /// The aborted batches of this cycle, if any.
    pub fn failed_batches(&self) -> Vec<&BatchReport> {
        match self {
            CycleReport::Skipped => Vec::new(),
            CycleReport::Completed { batches, .. } => batches
                .iter()
                .filter(|b| !b.outcome.is_committed())
                .collect(),
        }
    }
}
