//! Command channel: priority- and retry-aware delivery of command envelopes.

mod memory;

pub use memory::InMemoryChannel;

use async_trait::async_trait;

use crate::domain::{CommandEnvelope, EnvelopeId, RelayError, SendOptions};

/// Name of the companion dead-letter queue for a command stream.
///
/// Envelopes that exhaust their retry budget land here, retry count preserved
/// at zero so consumers can tell exhausted dead letters from fresh errors.
pub fn error_queue_name(queue: &str) -> String {
    format!("{queue}.errors")
}

/// What `handle_processing_error` did with the envelope. Exactly one of the
/// two happens for every well-formed envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Redelivered to the same queue with one fewer retry.
    Resent,
    /// Moved to the companion error queue; will not be resent again.
    DeadLettered,
}

/// Delivery abstraction over a durable transport (broker exchange, DB-backed
/// queue, or the in-process implementation in this module).
///
/// Delivery order is priority-first (lower value wins), then transport order
/// (FIFO here) among equal priorities. Redelivered envelopes re-enter the
/// same ordering. Every delivered envelope ends up acknowledged (consumed),
/// resent, or dead-lettered; the only silent drop is explicit TTL expiry.
///
/// Transport connectivity failures surface as `ChannelUnavailable` and are
/// never retried by the channel itself; the retry budget is strictly for
/// application-level processing failures.
#[async_trait]
pub trait CommandChannel: Send + Sync {
    /// Wrap `arguments` into an envelope and hand it to the transport, keyed
    /// by `command` name.
    async fn send(
        &self,
        command: &str,
        arguments: Vec<serde_json::Value>,
        options: SendOptions,
    ) -> Result<EnvelopeId, RelayError>;

    /// Pop a single envelope, or `None` when the queue is empty. Blocking
    /// policy is transport-defined; the in-memory transport never blocks.
    async fn receive_one(&self, queue: &str) -> Result<Option<CommandEnvelope>, RelayError>;

    /// Drain every currently available envelope without blocking (batch
    /// pre-fetch, e.g. cursor priming before subscribing).
    async fn receive_all(&self, queue: &str) -> Result<Vec<CommandEnvelope>, RelayError>;

    /// The retry/dead-letter decision point for an envelope whose processing
    /// failed: resend with a decremented budget while retries remain,
    /// otherwise move it to the error queue.
    async fn handle_processing_error(
        &self,
        envelope: CommandEnvelope,
    ) -> Result<RecoveryAction, RelayError>;
}
