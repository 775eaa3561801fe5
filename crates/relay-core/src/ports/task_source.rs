//! Task source port: where the scheduler gets its work from.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::RelayError;

/// One unit of work for a scheduling cycle: a label for reporting plus the
/// opaque task descriptors the source needs to execute it (e.g.
/// `{path, checksum}` entries). Produced fresh each cycle and consumed once;
/// the scheduler never persists batches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskBatch {
    label: String,
    tasks: Vec<serde_json::Value>,
}

impl TaskBatch {
    pub fn new(label: impl Into<String>, tasks: Vec<serde_json::Value>) -> Self {
        Self {
            label: label.into(),
            tasks,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn tasks(&self) -> &[serde_json::Value] {
        &self.tasks
    }
}

/// Provider of task batches for one scheduling cycle, plus the cycle hooks.
///
/// One implementation per automation domain (git mirroring, installs, ...).
/// The scheduler drives it: `should_run` gates the cycle, `get_task_batches`
/// fetches the work, `run_batch` executes one batch inside a transaction
/// boundary, and `update_watermark` records a fully successful cycle.
///
/// Implementations that need exclusivity across scheduler instances take and
/// release their lock in the cycle hooks.
#[async_trait]
pub trait TaskSource: Send + Sync {
    /// Cheap precondition check ("is there new work since the watermark?").
    /// `false` skips the entire cycle.
    async fn should_run(&self) -> Result<bool, RelayError>;

    /// The work to perform this cycle. May be empty. A failure here aborts
    /// the cycle before any batch side effects.
    async fn get_task_batches(&self) -> Result<Vec<TaskBatch>, RelayError>;

    /// Execute one batch's task logic. Called inside an open transaction
    /// scope; failures abort that scope.
    async fn run_batch(&self, batch: &TaskBatch) -> Result<(), RelayError>;

    /// Bracketing call before a non-skipped cycle.
    async fn pre_cycle_hook(&self) -> Result<(), RelayError> {
        Ok(())
    }

    /// Bracketing call after the cycle's batches (and watermark decision).
    async fn post_cycle_hook(&self) -> Result<(), RelayError> {
        Ok(())
    }

    /// Record that every batch in the cycle committed. Only called then.
    async fn update_watermark(&self) -> Result<(), RelayError>;
}
