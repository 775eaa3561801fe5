use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the relay components.
///
/// Recovery policy differs per variant:
/// - `TaskExecution` / `TaskTimeout` are recovered per batch (abort + continue).
/// - `TransactionBegin` fails the affected batch only.
/// - `ChannelUnavailable` and `InvalidCommand` surface to the caller as-is.
/// - `RetryExhausted` indicates a caller skipped the `can_retry()` check.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("channel unavailable: {0}")]
    ChannelUnavailable(String),

    #[error("retry budget already exhausted")]
    RetryExhausted,

    #[error("cannot begin transaction: {0}")]
    TransactionBegin(String),

    #[error("task execution failed: {0}")]
    TaskExecution(String),

    #[error("batch exceeded timeout of {0:?}")]
    TaskTimeout(Duration),
}
