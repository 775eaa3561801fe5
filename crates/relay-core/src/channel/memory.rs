//! In-memory channel implementation.

use std::collections::{BinaryHeap, HashMap};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::{CommandChannel, RecoveryAction, error_queue_name};
use crate::domain::{CommandEnvelope, CommandName, EnvelopeId, RelayError, SendOptions};
use crate::ports::{Clock, SystemClock};

/// Heap entry: envelope plus its send sequence number.
///
/// Reverse ordering so `BinaryHeap` pops the lowest priority value first
/// (lower value = higher priority), FIFO among equal priorities.
#[derive(Debug, Clone)]
struct QueuedEnvelope {
    seq: u64,
    envelope: CommandEnvelope,
}

impl PartialEq for QueuedEnvelope {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for QueuedEnvelope {}

impl PartialOrd for QueuedEnvelope {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEnvelope {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .envelope
            .priority()
            .cmp(&self.envelope.priority())
            .then(other.seq.cmp(&self.seq))
    }
}

/// Instance-owned channel state. Never shared process-wide.
struct ChannelState {
    /// Queues keyed by command name; companion error queues live in the same
    /// map under the derived `<queue>.errors` name.
    queues: HashMap<String, BinaryHeap<QueuedEnvelope>>,

    /// Global send sequence, the FIFO tiebreaker.
    next_seq: u64,

    /// Once closed, every operation fails with `ChannelUnavailable`.
    closed: bool,
}

impl ChannelState {
    fn new() -> Self {
        Self {
            queues: HashMap::new(),
            next_seq: 0,
            closed: false,
        }
    }

    fn ensure_available(&self) -> Result<(), RelayError> {
        if self.closed {
            return Err(RelayError::ChannelUnavailable(
                "channel is closed".to_string(),
            ));
        }
        Ok(())
    }

    fn push(&mut self, queue: &str, envelope: CommandEnvelope) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queues
            .entry(queue.to_string())
            .or_default()
            .push(QueuedEnvelope { seq, envelope });
    }
}

/// In-process channel backed by per-queue priority heaps.
///
/// The reference transport: single async mutex around the state, non-blocking
/// receives, TTL-expired envelopes dropped at delivery time.
pub struct InMemoryChannel<C = SystemClock> {
    state: Mutex<ChannelState>,
    clock: C,
}

impl InMemoryChannel<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for InMemoryChannel<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> InMemoryChannel<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            state: Mutex::new(ChannelState::new()),
            clock,
        }
    }

    /// Close the channel. Subsequent operations fail with
    /// `ChannelUnavailable`; already-received envelopes are unaffected.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        state.closed = true;
        info!("channel closed");
    }

    /// Pop the next non-expired envelope from `queue`, dropping expired ones.
    fn pop_live(&self, state: &mut ChannelState, queue: &str) -> Option<CommandEnvelope> {
        let heap = state.queues.get_mut(queue)?;
        while let Some(entry) = heap.pop() {
            if entry.envelope.is_expired(self.clock.now()) {
                debug!(
                    envelope = %entry.envelope.id(),
                    queue,
                    "dropping expired envelope"
                );
                continue;
            }
            return Some(entry.envelope);
        }
        None
    }
}

#[async_trait]
impl<C: Clock> CommandChannel for InMemoryChannel<C> {
    async fn send(
        &self,
        command: &str,
        arguments: Vec<serde_json::Value>,
        options: SendOptions,
    ) -> Result<EnvelopeId, RelayError> {
        let command = CommandName::new(command)?;

        let mut state = self.state.lock().await;
        state.ensure_available()?;

        let now = self.clock.now();
        let id = EnvelopeId::generate(now);
        let envelope = CommandEnvelope::new(id, command.clone(), arguments, now, options);

        debug!(
            envelope = %id,
            command = %command,
            priority = envelope.priority(),
            max_retry = envelope.max_retry(),
            "envelope sent"
        );
        state.push(command.as_str(), envelope);
        Ok(id)
    }

    async fn receive_one(&self, queue: &str) -> Result<Option<CommandEnvelope>, RelayError> {
        let mut state = self.state.lock().await;
        state.ensure_available()?;
        Ok(self.pop_live(&mut state, queue))
    }

    async fn receive_all(&self, queue: &str) -> Result<Vec<CommandEnvelope>, RelayError> {
        let mut state = self.state.lock().await;
        state.ensure_available()?;

        let mut drained = Vec::new();
        while let Some(envelope) = self.pop_live(&mut state, queue) {
            drained.push(envelope);
        }
        Ok(drained)
    }

    async fn handle_processing_error(
        &self,
        envelope: CommandEnvelope,
    ) -> Result<RecoveryAction, RelayError> {
        let queue = envelope.command().as_str().to_string();

        let mut state = self.state.lock().await;
        state.ensure_available()?;

        if envelope.can_retry() {
            let retried = envelope.decrement_retry()?;
            warn!(
                envelope = %retried.id(),
                queue = %queue,
                retries_left = retried.max_retry(),
                "processing failed, resending"
            );
            state.push(&queue, retried);
            Ok(RecoveryAction::Resent)
        } else {
            // Retry count stays at literal zero so error-queue consumers can
            // distinguish exhausted dead letters from fresh errors.
            let dead_letter_queue = error_queue_name(&queue);
            error!(
                envelope = %envelope.id(),
                queue = %dead_letter_queue,
                "retry budget exhausted, dead-lettering"
            );
            state.push(&dead_letter_queue, envelope);
            Ok(RecoveryAction::DeadLettered)
        }
    }
}
