//! relay-core
//!
//! Core building blocks for the Relay scheduler: a transactional task
//! scheduler with a retry-aware command relay.
//!
//! # Modules
//! - **domain**: value types (ids, command envelope, run watermark, errors)
//! - **ports**: injection seams (TaskSource, TransactionBoundary, Clock)
//! - **channel**: priority/retry-aware command delivery with a dead-letter
//!   stream per queue (trait + in-memory transport)
//! - **scheduler**: the cycle orchestrator (per-batch transactions, optional
//!   timeout isolation, watermark gating)

pub mod channel;
pub mod domain;
pub mod ports;
pub mod scheduler;
