//! Command envelope: one relayable unit of work plus its delivery metadata.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EnvelopeId;
use super::errors::RelayError;

/// Default priority (mid-range; lower value = higher priority).
pub const DEFAULT_PRIORITY: u8 = 128;

/// Default retry budget for a freshly sent command.
pub const DEFAULT_MAX_RETRY: u32 = 3;

/// Name of the operation a command envelope carries (e.g. "install",
/// "mirror-update"). Non-empty by construction; doubles as the queue key on
/// the channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandName(String);

impl CommandName {
    pub fn new(s: impl Into<String>) -> Result<Self, RelayError> {
        let s = s.into();
        if s.trim().is_empty() {
            return Err(RelayError::InvalidCommand(
                "command name must not be empty".to_string(),
            ));
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Optional send parameters and their defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOptions {
    pub priority: u8,
    pub max_retry: u32,
    pub expiration: Option<Duration>,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            priority: DEFAULT_PRIORITY,
            max_retry: DEFAULT_MAX_RETRY,
            expiration: None,
        }
    }
}

/// One relayable unit of work.
///
/// Read-only after construction except for the retry counter, which only
/// `decrement_retry` touches (producing a new envelope; the channel uses it
/// when resending). `max_retry == 0` means the next processing failure
/// dead-letters the envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    id: EnvelopeId,
    command: CommandName,
    arguments: Vec<serde_json::Value>,
    trigger_time: DateTime<Utc>,
    priority: u8,
    max_retry: u32,
    expiration: Option<Duration>,
}

impl CommandEnvelope {
    pub fn new(
        id: EnvelopeId,
        command: CommandName,
        arguments: Vec<serde_json::Value>,
        trigger_time: DateTime<Utc>,
        options: SendOptions,
    ) -> Self {
        Self {
            id,
            command,
            arguments,
            trigger_time,
            priority: options.priority,
            max_retry: options.max_retry,
            expiration: options.expiration,
        }
    }

    pub fn id(&self) -> EnvelopeId {
        self.id
    }

    pub fn command(&self) -> &CommandName {
        &self.command
    }

    pub fn arguments(&self) -> &[serde_json::Value] {
        &self.arguments
    }

    pub fn trigger_time(&self) -> DateTime<Utc> {
        self.trigger_time
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn max_retry(&self) -> u32 {
        self.max_retry
    }

    pub fn expiration(&self) -> Option<Duration> {
        self.expiration
    }

    /// Does this envelope have redelivery budget left?
    pub fn can_retry(&self) -> bool {
        self.max_retry > 0
    }

    /// Copy of this envelope with one fewer retry, everything else intact.
    ///
    /// Callers must check `can_retry()` first; decrementing at zero is a
    /// programming error and fails with `RetryExhausted`.
    pub fn decrement_retry(&self) -> Result<Self, RelayError> {
        if self.max_retry == 0 {
            return Err(RelayError::RetryExhausted);
        }
        let mut retried = self.clone();
        retried.max_retry -= 1;
        Ok(retried)
    }

    /// TTL check: has `expiration` elapsed since `trigger_time`?
    ///
    /// Envelopes without a TTL never expire. Transports call this at
    /// delivery time and may drop expired envelopes unconsumed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let Some(ttl) = self.expiration else {
            return false;
        };
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => now - self.trigger_time >= ttl,
            // A TTL too large for chrono arithmetic can never elapse.
            Err(_) => false,
        }
    }
}
