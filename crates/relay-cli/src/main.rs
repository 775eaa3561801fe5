use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use relay_core::channel::{CommandChannel, InMemoryChannel, RecoveryAction, error_queue_name};
use relay_core::domain::{RelayError, RunWatermark, SendOptions};
use relay_core::ports::{
    Clock, SystemClock, TaskBatch, TaskSource, TransactionBoundary, TransactionPhase,
};
use relay_core::scheduler::{CycleReport, Scheduler, SchedulerConfig};

#[derive(Debug, Deserialize)]
struct MirrorTarget {
    id: String,
}

/// Sample task source: keeps a set of mirrors in sync, one batch per mirror.
/// `repo-b` fails a fixed number of times before succeeding, so the first
/// cycles stay dirty and the watermark only advances once everything commits.
struct MirrorSource {
    targets: Vec<&'static str>,
    remaining_failures: AtomicU32,
    watermark: Mutex<Option<RunWatermark>>,
}

impl MirrorSource {
    fn new(targets: Vec<&'static str>, failures: u32) -> Self {
        Self {
            targets,
            remaining_failures: AtomicU32::new(failures),
            watermark: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TaskSource for MirrorSource {
    async fn should_run(&self) -> Result<bool, RelayError> {
        // Work exists until one cycle has gone fully clean.
        Ok(self.watermark.lock().unwrap().is_none())
    }

    async fn get_task_batches(&self) -> Result<Vec<TaskBatch>, RelayError> {
        Ok(self
            .targets
            .iter()
            .map(|id| TaskBatch::new(*id, vec![json!({ "id": id })]))
            .collect())
    }

    async fn run_batch(&self, batch: &TaskBatch) -> Result<(), RelayError> {
        let target: MirrorTarget = serde_json::from_value(batch.tasks()[0].clone())
            .map_err(|e| RelayError::TaskExecution(format!("bad task descriptor: {e}")))?;

        if target.id == "repo-b" {
            let left = self.remaining_failures.load(Ordering::Relaxed);
            if left > 0 {
                self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
                return Err(RelayError::TaskExecution(format!(
                    "upstream unreachable (left={left})"
                )));
            }
        }

        println!("synced mirror {}", target.id);
        Ok(())
    }

    async fn update_watermark(&self) -> Result<(), RelayError> {
        *self.watermark.lock().unwrap() = Some(RunWatermark::new(SystemClock.now()));
        Ok(())
    }
}

/// Sample transaction boundary: an unpublished filesystem snapshot that is
/// either published (commit) or thrown away (abort).
struct SnapshotBoundary {
    phase: Mutex<TransactionPhase>,
}

impl SnapshotBoundary {
    fn new() -> Self {
        Self {
            phase: Mutex::new(TransactionPhase::Closed),
        }
    }
}

#[async_trait]
impl TransactionBoundary for SnapshotBoundary {
    async fn begin(&self) -> Result<(), RelayError> {
        let mut phase = self.phase.lock().unwrap();
        if !phase.can_begin() {
            return Err(RelayError::TransactionBegin(
                "a snapshot is already open".to_string(),
            ));
        }
        *phase = TransactionPhase::Open;
        println!("  snapshot opened");
        Ok(())
    }

    async fn commit(&self) -> Result<(), RelayError> {
        // Call order (begin, then commit or abort) is the scheduler's job.
        *self.phase.lock().unwrap() = TransactionPhase::Committed;
        println!("  snapshot published");
        Ok(())
    }

    async fn abort(&self) -> Result<(), RelayError> {
        *self.phase.lock().unwrap() = TransactionPhase::Aborted;
        println!("  snapshot discarded");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), RelayError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // (A) スケジューラ側のデモ: TaskSource と TransactionBoundary をつなぐ
    let source = Arc::new(MirrorSource::new(vec!["repo-a", "repo-b"], 2));
    let boundary = Arc::new(SnapshotBoundary::new());
    let scheduler = Scheduler::new(
        source.clone(),
        boundary,
        SchedulerConfig {
            batch_timeout: Some(Duration::from_secs(30)),
        },
    );

    // (B) repo-b が 2 回失敗する間は watermark が進まず、全バッチを再実行する
    for tick in 1.. {
        let report = scheduler.run_cycle().await?;
        match &report {
            CycleReport::Skipped => {
                println!("tick {tick}: nothing to do");
                break;
            }
            CycleReport::Completed { all_ok, .. } => {
                println!(
                    "tick {tick}: cycle {} ({} failed batches)",
                    if *all_ok { "clean" } else { "dirty" },
                    report.failed_batches().len()
                );
            }
        }
    }

    // (C) relay side: commands delivered by priority, retried on failure,
    // dead-lettered when the budget runs out.
    let channel = InMemoryChannel::new();
    channel
        .send(
            "install",
            vec![json!("lcg-toolchain"), json!("x86_64")],
            SendOptions {
                priority: 20,
                max_retry: 2,
                ..SendOptions::default()
            },
        )
        .await?;
    channel
        .send("install", vec![json!("nightly-build")], SendOptions::default())
        .await?;
    channel
        .send(
            "install",
            vec![json!("hotfix")],
            SendOptions {
                priority: 1,
                max_retry: 0,
                ..SendOptions::default()
            },
        )
        .await?;

    // (D) consume: the hotfix install keeps failing and goes straight to the
    // error queue; everything else is acknowledged by consumption.
    while let Some(envelope) = channel.receive_one("install").await? {
        let failed = envelope.arguments()[0] == json!("hotfix");
        if failed {
            match channel.handle_processing_error(envelope).await? {
                RecoveryAction::Resent => println!("install failed, will retry"),
                RecoveryAction::DeadLettered => println!("install failed for good"),
            }
        } else {
            println!("installed {}", envelope.arguments()[0]);
        }
    }

    for dead in channel.receive_all(&error_queue_name("install")).await? {
        println!(
            "dead letter: {:?} (retries left: {})",
            dead.arguments()[0],
            dead.max_retry()
        );
    }

    // (E) サンプルなのでここで閉じる（本番は graceful shutdown を設計する）
    channel.close().await;
    Ok(())
}
