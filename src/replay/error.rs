//! Replay error taxonomy.

use std::fmt;

use thiserror::Error;

use crate::core::hash::StateDigest;
use crate::core::rng::SnapshotError;
use crate::game::action::ActionKind;

/// Fatal or refusing errors raised while rebuilding a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplayError {
    /// Log names an action kind this build does not know.
    #[error("unknown action kind {0:?}")]
    UnknownActionKind(String),

    /// Payload does not fit its action kind.
    #[error("malformed {kind} payload: {reason}")]
    MalformedPayload {
        /// Kind being parsed
        kind: ActionKind,
        /// Parser message
        reason: String,
    },

    /// Log cannot account for every turn of the session. Replay is refused.
    #[error("incomplete log: {0}")]
    IncompleteLog(String),

    /// A stored generator snapshot cannot be restored.
    #[error("random state corrupt before action {action_index} (turn {turn}): {source}")]
    RandomStateCorrupt {
        /// Position in the action log
        action_index: usize,
        /// Turn number of that action
        turn: u64,
        /// Why restore failed
        source: SnapshotError,
    },

    /// Record written by an incompatible format version.
    #[error("unsupported format version {found} (supported: {supported})")]
    UnsupportedVersion {
        /// Version in the record
        found: u32,
        /// Version this build reads
        supported: u32,
    },

    /// Replayed state could not be hashed for comparison.
    #[error("cannot hash replayed state: {0}")]
    StateEncoding(String),

    /// Record bytes are not a valid replay record.
    #[error("codec error: {0}")]
    Codec(String),
}

impl From<serde_json::Error> for ReplayError {
    fn from(e: serde_json::Error) -> Self {
        ReplayError::Codec(e.to_string())
    }
}

/// Replayed state differs from the checksum stored during live play.
///
/// Reported, never fatal: reconstruction continues and the result is
/// flagged untrusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismViolation {
    /// Position in the action log
    pub action_index: usize,
    /// Turn number of that action
    pub turn: u64,
    /// Kind of the diverging action
    pub action_kind: String,
    /// Hash recorded live
    pub expected: StateDigest,
    /// Hash computed by replay
    pub computed: StateDigest,
}

impl fmt::Display for DeterminismViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "determinism violation at action {} (turn {}, {}): expected {}, computed {}",
            self.action_index,
            self.turn,
            self.action_kind,
            self.expected.short(),
            self.computed.short()
        )
    }
}
