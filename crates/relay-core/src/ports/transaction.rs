//! Transaction boundary port: begin/commit/abort around one batch.

use async_trait::async_trait;

use crate::domain::RelayError;

/// Phase of a transaction scope.
///
/// Transitions: `Closed -> Open` (begin) `-> Committed | Aborted`, both of
/// which close the scope again. Implementations hold one of these and check
/// it on every operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionPhase {
    Closed,
    Open,
    Committed,
    Aborted,
}

impl TransactionPhase {
    /// Can a new scope be opened from this phase?
    pub fn can_begin(self) -> bool {
        !matches!(self, TransactionPhase::Open)
    }

    /// Is a scope currently open (commit/abort are the only valid moves)?
    pub fn is_open(self) -> bool {
        matches!(self, TransactionPhase::Open)
    }
}

/// Brackets the side effects of one batch so partial failures can be rolled
/// back at the domain level (e.g. abort an unpublished filesystem snapshot).
///
/// The scheduler guarantees the call order per batch: `begin`, then exactly
/// one of `commit` (all tasks succeeded) or `abort` (task failure, timeout,
/// or commit failure).
#[async_trait]
pub trait TransactionBoundary: Send + Sync {
    /// Open a transactional scope. Fails with `TransactionBegin` if a scope
    /// is already open.
    async fn begin(&self) -> Result<(), RelayError>;

    /// Make the batch's effects visible/durable.
    async fn commit(&self) -> Result<(), RelayError>;

    /// Discard the batch's effects.
    async fn abort(&self) -> Result<(), RelayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_an_open_scope_blocks_begin() {
        assert!(TransactionPhase::Closed.can_begin());
        assert!(TransactionPhase::Committed.can_begin());
        assert!(TransactionPhase::Aborted.can_begin());
        assert!(!TransactionPhase::Open.can_begin());
    }

    #[test]
    fn only_open_accepts_commit_or_abort() {
        assert!(TransactionPhase::Open.is_open());
        assert!(!TransactionPhase::Closed.is_open());
        assert!(!TransactionPhase::Committed.is_open());
        assert!(!TransactionPhase::Aborted.is_open());
    }
}
