//! Update orchestration: the staged pipeline, its state machine, and the
//! singleton operation slot.

pub mod error;
pub mod installer;
pub mod operation;
pub mod orchestrator;
mod pipeline;

pub use error::{CancelError, StartError, StepError};
pub use operation::{UpdateOperation, UpdatePhase};
