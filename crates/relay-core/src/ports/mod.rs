//! Ports: the dependency-injection seams.
//!
//! Each trait hides an external collaborator behind an interface: the task
//! source (what work exists), the transaction boundary (how a batch's side
//! effects are made durable or rolled back), and the clock. Concrete
//! implementations are injected at construction time; nothing here is
//! process-global.

pub mod clock;
pub mod task_source;
pub mod transaction;

pub use clock::{Clock, FixedClock, SystemClock};
pub use task_source::{TaskBatch, TaskSource};
pub use transaction::{TransactionBoundary, TransactionPhase};
