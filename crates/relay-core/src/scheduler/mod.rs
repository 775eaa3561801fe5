//! Scheduler: drives scheduling cycles over a task source and a transaction
//! boundary.
//!
//! One cycle: check `should_run`, fetch batches, execute each batch under its
//! own begin/commit-or-abort scope (sequentially, in source order), then
//! advance the watermark only if every batch committed. A failing batch never
//! stops the remaining batches; a failing fetch or pre-hook fails the whole
//! cycle before any batch side effects.

mod report;

pub use report::{BatchFailure, BatchOutcome, BatchReport, CycleReport};

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::domain::{CycleId, RelayError};
use crate::ports::{Clock, SystemClock, TaskBatch, TaskSource, TransactionBoundary};

/// Scheduler knobs.
#[derive(Debug, Clone, Default)]
pub struct SchedulerConfig {
    /// Per-batch execution timeout. `None` (or zero) disables isolation and
    /// runs batch logic inline on the scheduler's task.
    pub batch_timeout: Option<Duration>,
}

/// The cycle orchestrator. Collaborators are injected at construction; the
/// scheduler owns no state beyond them and holds no locks of its own.
pub struct Scheduler<C = SystemClock> {
    source: Arc<dyn TaskSource>,
    transaction: Arc<dyn TransactionBoundary>,
    config: SchedulerConfig,
    clock: C,
}

impl Scheduler<SystemClock> {
    pub fn new(
        source: Arc<dyn TaskSource>,
        transaction: Arc<dyn TransactionBoundary>,
        config: SchedulerConfig,
    ) -> Self {
        Self::with_clock(source, transaction, config, SystemClock)
    }
}

impl<C: Clock> Scheduler<C> {
    pub fn with_clock(
        source: Arc<dyn TaskSource>,
        transaction: Arc<dyn TransactionBoundary>,
        config: SchedulerConfig,
        clock: C,
    ) -> Self {
        Self {
            source,
            transaction,
            config,
            clock,
        }
    }

    /// Run one scheduling cycle to completion.
    ///
    /// Returns `Err` only for cycle-level failures (`should_run`, hooks,
    /// batch fetch, watermark update); in that case the cycle counts as
    /// not-run and the watermark is untouched. Batch-level failures are
    /// reported in the returned `CycleReport`.
    pub async fn run_cycle(&self) -> Result<CycleReport, RelayError> {
        if !self.source.should_run().await? {
            info!("nothing to do, skipping cycle");
            return Ok(CycleReport::Skipped);
        }

        self.source.pre_cycle_hook().await?;
        let batches = self.source.get_task_batches().await?;

        let cycle_id = CycleId::generate(self.clock.now());
        info!(%cycle_id, batches = batches.len(), "cycle started");

        let mut reports = Vec::with_capacity(batches.len());
        let mut all_ok = true;
        for batch in &batches {
            let outcome = self.run_one_batch(batch).await;
            match &outcome {
                BatchOutcome::Committed => {
                    info!(%cycle_id, batch = batch.label(), "batch committed");
                }
                BatchOutcome::Aborted(cause) => {
                    warn!(%cycle_id, batch = batch.label(), %cause, "batch aborted");
                    all_ok = false;
                }
            }
            reports.push(BatchReport {
                label: batch.label().to_string(),
                outcome,
            });
        }

        if all_ok {
            self.source.update_watermark().await?;
            info!(%cycle_id, "cycle clean, watermark advanced");
        } else {
            warn!(%cycle_id, "cycle had failures, watermark untouched");
        }
        self.source.post_cycle_hook().await?;

        Ok(CycleReport::Completed {
            cycle_id,
            all_ok,
            batches: reports,
        })
    }

    /// One batch under its transaction scope. Failures are absorbed into the
    /// outcome: one bad batch must not stop the rest of the cycle.
    async fn run_one_batch(&self, batch: &TaskBatch) -> BatchOutcome {
        if let Err(e) = self.transaction.begin().await {
            return BatchOutcome::Aborted(BatchFailure::Begin(e.to_string()));
        }

        let failure = match self.execute_batch(batch).await {
            Ok(()) => match self.transaction.commit().await {
                Ok(()) => return BatchOutcome::Committed,
                Err(e) => BatchFailure::Commit(e.to_string()),
            },
            Err(failure) => failure,
        };

        if let Err(e) = self.transaction.abort().await {
            // The batch stays aborted with its original cause.
            error!(batch = batch.label(), error = %e, "transaction abort failed");
        }
        BatchOutcome::Aborted(failure)
    }

    async fn execute_batch(&self, batch: &TaskBatch) -> Result<(), BatchFailure> {
        let limit = match self.config.batch_timeout {
            Some(limit) if !limit.is_zero() => limit,
            _ => {
                return self
                    .source
                    .run_batch(batch)
                    .await
                    .map_err(|e| BatchFailure::Task(e.to_string()));
            }
        };

        // Batch logic is arbitrary third-party code that may block without
        // ever honoring a cancellation signal, so it runs on its own tokio
        // task and gets killed at the deadline.
        let source = Arc::clone(&self.source);
        let owned = batch.clone();
        let mut handle = tokio::spawn(async move { source.run_batch(&owned).await });

        match tokio::time::timeout(limit, &mut handle).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(BatchFailure::Task(e.to_string())),
            Ok(Err(join)) => Err(BatchFailure::Task(format!("batch task panicked: {join}"))),
            Err(_elapsed) => {
                handle.abort();
                Err(BatchFailure::Timeout(limit))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    #[derive(Default)]
    struct RecordingSource {
        runnable: bool,
        batches: Vec<TaskBatch>,
        failing: HashSet<String>,
        hanging: HashSet<String>,
        fetch_fails: bool,
        pre_fails: bool,
        calls: StdMutex<Vec<String>>,
    }

    impl RecordingSource {
        fn with_batches(labels: &[&str]) -> Self {
            Self {
                runnable: true,
                batches: labels
                    .iter()
                    .map(|l| TaskBatch::new(*l, vec![serde_json::json!({ "id": l })]))
                    .collect(),
                ..Self::default()
            }
        }

        fn failing(mut self, label: &str) -> Self {
            self.failing.insert(label.to_string());
            self
        }

        fn hanging(mut self, label: &str) -> Self {
            self.hanging.insert(label.to_string());
            self
        }

        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TaskSource for RecordingSource {
        async fn should_run(&self) -> Result<bool, RelayError> {
            self.record("should_run");
            Ok(self.runnable)
        }

        async fn get_task_batches(&self) -> Result<Vec<TaskBatch>, RelayError> {
            self.record("fetch");
            if self.fetch_fails {
                return Err(RelayError::TaskExecution("batch fetch broke".to_string()));
            }
            Ok(self.batches.clone())
        }

        async fn run_batch(&self, batch: &TaskBatch) -> Result<(), RelayError> {
            self.record(format!("run:{}", batch.label()));
            if self.hanging.contains(batch.label()) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if self.failing.contains(batch.label()) {
                return Err(RelayError::TaskExecution(format!(
                    "{} blew up",
                    batch.label()
                )));
            }
            Ok(())
        }

        async fn pre_cycle_hook(&self) -> Result<(), RelayError> {
            self.record("pre");
            if self.pre_fails {
                return Err(RelayError::TaskExecution("pre hook broke".to_string()));
            }
            Ok(())
        }

        async fn post_cycle_hook(&self) -> Result<(), RelayError> {
            self.record("post");
            Ok(())
        }

        async fn update_watermark(&self) -> Result<(), RelayError> {
            self.record("watermark");
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingTx {
        calls: StdMutex<Vec<&'static str>>,
        begins: AtomicUsize,
        commits: AtomicUsize,
        fail_begin_on: Option<usize>,
        fail_commit_on: Option<usize>,
    }

    impl RecordingTx {
        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TransactionBoundary for RecordingTx {
        async fn begin(&self) -> Result<(), RelayError> {
            self.calls.lock().unwrap().push("begin");
            let nth = self.begins.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_begin_on == Some(nth) {
                return Err(RelayError::TransactionBegin("scope busy".to_string()));
            }
            Ok(())
        }

        async fn commit(&self) -> Result<(), RelayError> {
            self.calls.lock().unwrap().push("commit");
            let nth = self.commits.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_commit_on == Some(nth) {
                return Err(RelayError::TransactionBegin("publish failed".to_string()));
            }
            Ok(())
        }

        async fn abort(&self) -> Result<(), RelayError> {
            self.calls.lock().unwrap().push("abort");
            Ok(())
        }
    }

    fn harness(
        source: RecordingSource,
        tx: RecordingTx,
        config: SchedulerConfig,
    ) -> (Scheduler, Arc<RecordingSource>, Arc<RecordingTx>) {
        let source = Arc::new(source);
        let tx = Arc::new(tx);
        let source_dyn: Arc<dyn TaskSource> = source.clone();
        let tx_dyn: Arc<dyn TransactionBoundary> = tx.clone();
        (Scheduler::new(source_dyn, tx_dyn, config), source, tx)
    }

    #[tokio::test]
    async fn failed_batch_does_not_stop_the_cycle() {
        let (scheduler, source, tx) = harness(
            RecordingSource::with_batches(&["b1", "b2", "b3"]).failing("b2"),
            RecordingTx::default(),
            SchedulerConfig::default(),
        );

        let report = scheduler.run_cycle().await.unwrap();

        assert!(!report.is_clean());
        assert_eq!(
            tx.calls(),
            vec!["begin", "commit", "begin", "abort", "begin", "commit"]
        );
        // All three batches were attempted despite b2 failing.
        let runs: Vec<_> = source
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("run:"))
            .collect();
        assert_eq!(runs, vec!["run:b1", "run:b2", "run:b3"]);

        let failed = report.failed_batches();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].label, "b2");
        assert!(matches!(failed[0].outcome, BatchOutcome::Aborted(BatchFailure::Task(_))));
    }

    #[tokio::test]
    async fn watermark_advances_only_on_a_clean_cycle() {
        let (scheduler, source, _tx) = harness(
            RecordingSource::with_batches(&["b1", "b2"]),
            RecordingTx::default(),
            SchedulerConfig::default(),
        );
        let report = scheduler.run_cycle().await.unwrap();
        assert!(report.is_clean());
        assert_eq!(source.calls().iter().filter(|c| *c == "watermark").count(), 1);

        let (scheduler, source, _tx) = harness(
            RecordingSource::with_batches(&["b1", "b2"]).failing("b1"),
            RecordingTx::default(),
            SchedulerConfig::default(),
        );
        let report = scheduler.run_cycle().await.unwrap();
        assert!(!report.is_clean());
        assert!(!source.calls().contains(&"watermark".to_string()));
        // The post hook still runs on a dirty cycle.
        assert!(source.calls().contains(&"post".to_string()));
    }

    #[tokio::test]
    async fn empty_batch_list_is_a_clean_cycle() {
        let (scheduler, source, tx) = harness(
            RecordingSource::with_batches(&[]),
            RecordingTx::default(),
            SchedulerConfig::default(),
        );

        let report = scheduler.run_cycle().await.unwrap();

        assert!(report.is_clean());
        assert!(tx.calls().is_empty());
        assert!(source.calls().contains(&"watermark".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_batch_is_terminated_at_the_timeout() {
        let (scheduler, source, tx) = harness(
            RecordingSource::with_batches(&["stuck", "fine"]).hanging("stuck"),
            RecordingTx::default(),
            SchedulerConfig {
                batch_timeout: Some(Duration::from_secs(5)),
            },
        );

        let report = scheduler.run_cycle().await.unwrap();

        assert!(!report.is_clean());
        // The stuck batch was aborted, and the cycle still reached "fine".
        assert_eq!(tx.calls(), vec!["begin", "abort", "begin", "commit"]);
        let failed = report.failed_batches();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].label, "stuck");
        assert_eq!(
            failed[0].outcome,
            BatchOutcome::Aborted(BatchFailure::Timeout(Duration::from_secs(5)))
        );
        assert!(source.calls().contains(&"run:fine".to_string()));
    }

    #[tokio::test]
    async fn skipped_cycle_touches_nothing() {
        let (scheduler, source, tx) = harness(
            RecordingSource {
                runnable: false,
                ..RecordingSource::with_batches(&["b1"])
            },
            RecordingTx::default(),
            SchedulerConfig::default(),
        );

        let report = scheduler.run_cycle().await.unwrap();

        assert_eq!(report, CycleReport::Skipped);
        assert_eq!(source.calls(), vec!["should_run"]);
        assert!(tx.calls().is_empty());
    }

    #[tokio::test]
    async fn one_failing_repo_blocks_the_watermark_but_not_its_peers() {
        let (scheduler, source, tx) = harness(
            RecordingSource::with_batches(&["repo-a", "repo-b"]).failing("repo-b"),
            RecordingTx::default(),
            SchedulerConfig::default(),
        );

        let report = scheduler.run_cycle().await.unwrap();

        assert_eq!(tx.calls(), vec!["begin", "commit", "begin", "abort"]);
        assert!(!source.calls().contains(&"watermark".to_string()));
        match report {
            CycleReport::Completed { all_ok, batches, .. } => {
                assert!(!all_ok);
                assert!(batches[0].outcome.is_committed());
                assert!(!batches[1].outcome.is_committed());
            }
            CycleReport::Skipped => panic!("cycle should have run"),
        }
    }

    #[tokio::test]
    async fn fetch_failure_fails_the_cycle_before_any_side_effects() {
        let (scheduler, source, tx) = harness(
            RecordingSource {
                fetch_fails: true,
                ..RecordingSource::with_batches(&["b1"])
            },
            RecordingTx::default(),
            SchedulerConfig::default(),
        );

        let result = scheduler.run_cycle().await;

        assert!(result.is_err());
        assert!(tx.calls().is_empty());
        assert_eq!(source.calls(), vec!["should_run", "pre", "fetch"]);
    }

    #[tokio::test]
    async fn pre_hook_failure_fails_the_cycle() {
        let (scheduler, source, tx) = harness(
            RecordingSource {
                pre_fails: true,
                ..RecordingSource::with_batches(&["b1"])
            },
            RecordingTx::default(),
            SchedulerConfig::default(),
        );

        let result = scheduler.run_cycle().await;

        assert!(result.is_err());
        assert!(tx.calls().is_empty());
        assert_eq!(source.calls(), vec!["should_run", "pre"]);
    }

    #[tokio::test]
    async fn begin_failure_aborts_only_that_batch() {
        let (scheduler, source, tx) = harness(
            RecordingSource::with_batches(&["b1", "b2"]),
            RecordingTx {
                fail_begin_on: Some(1),
                ..RecordingTx::default()
            },
            SchedulerConfig::default(),
        );

        let report = scheduler.run_cycle().await.unwrap();

        // b1 never ran; b2 went through normally.
        assert_eq!(tx.calls(), vec!["begin", "begin", "commit"]);
        let runs: Vec<_> = source
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("run:"))
            .collect();
        assert_eq!(runs, vec!["run:b2"]);

        let failed = report.failed_batches();
        assert_eq!(failed.len(), 1);
        assert!(matches!(
            failed[0].outcome,
            BatchOutcome::Aborted(BatchFailure::Begin(_))
        ));
    }

    #[tokio::test]
    async fn commit_failure_counts_as_a_batch_failure() {
        let (scheduler, source, tx) = harness(
            RecordingSource::with_batches(&["b1"]),
            RecordingTx {
                fail_commit_on: Some(1),
                ..RecordingTx::default()
            },
            SchedulerConfig::default(),
        );

        let report = scheduler.run_cycle().await.unwrap();

        assert_eq!(tx.calls(), vec!["begin", "commit", "abort"]);
        assert!(!report.is_clean());
        assert!(!source.calls().contains(&"watermark".to_string()));
        assert!(matches!(
            report.failed_batches()[0].outcome,
            BatchOutcome::Aborted(BatchFailure::Commit(_))
        ));
    }
}
