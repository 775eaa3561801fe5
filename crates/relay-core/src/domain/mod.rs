//! Domain model (IDs, command envelope, watermark, errors).

pub mod command;
pub mod errors;
pub mod ids;
pub mod watermark;

pub use command::{CommandEnvelope, CommandName, DEFAULT_MAX_RETRY, DEFAULT_PRIORITY, SendOptions};
pub use errors::RelayError;
pub use ids::{CycleId, EnvelopeId};
pub use watermark::RunWatermark;
