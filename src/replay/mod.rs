//! Command log and replay.
//!
//! Recording during live play, the persisted record format, and the
//! machinery that rebuilds and inspects historical states from it.

pub mod debugger;
pub mod error;
pub mod factory;
pub mod reconstruct;
pub mod record;
pub mod recorder;

pub use debugger::{DebuggerError, DebuggerState, DebuggerView, ReplayDebugger};
pub use error::{DeterminismViolation, ReplayError};
pub use factory::ActionFactory;
pub use reconstruct::{Reconstruction, Reconstructor, ReplayStepper};
pub use record::{ActionRecord, ReplayRecord, StateCheckpoint, SummaryMetadata, FORMAT_VERSION};
pub use recorder::{ActionLog, ActionRecorder, Recorded, RecorderError};
