//! Replay Record
//!
//! The persisted form of a session: initial state, seed, the ordered action
//! log and summary metadata. Field names on the wire are camelCase.
//!
//! Generator snapshots are kept as text here and only parsed during replay,
//! so one damaged snapshot halts replay at its own action instead of making
//! the whole file unreadable.
//!
//! ```text
//! {
//!   "gameId": "...", "formatVersion": 1, "initialState": {...},
//!   "initialRandomSnapshot": "xs128p/1:...",
//!   "seed": "test-seed", "rules": {...},
//!   "actions": [
//!     { "turnNumber": 1, "timestamp": 1700000000000, "actionKind": "MOVE",
//!       "actorKind": "player", "payload": {"direction": "right"},
//!       "randomSnapshotBefore": "xs128p/1:..." }
//!   ],
//!   "summaryMetadata": { "turnCount": 1, "actorName": "Ada", "depth": 1,
//!                        "outcome": "ongoing" },
//!   "checkpoints": [ { "actionIndex": 0, "stateHash": "..." } ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::core::hash::StateDigest;
use crate::core::rng::{RngSnapshot, Seed, SnapshotError};
use crate::game::action::ActorKind;
use crate::game::rules::Rules;
use crate::game::state::{GameState, Outcome};
use crate::replay::error::ReplayError;

/// Record format version written by this build.
pub const FORMAT_VERSION: u32 = 1;

/// One logged action.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRecord {
    /// Player turn this action belongs to
    pub turn_number: u64,
    /// Wall clock in ms since the epoch. Diagnostic only.
    pub timestamp: i64,
    /// Kind tag, kept as text so unknown kinds survive decoding
    pub action_kind: String,
    /// Who issued the action
    pub actor_kind: ActorKind,
    /// Kind-specific data
    #[serde(default)]
    pub payload: Value,
    /// Generator state captured before the action ran, in its text encoding
    pub random_snapshot_before: String,
}

impl ActionRecord {
    /// Decode the stored generator snapshot.
    pub fn random_snapshot(&self) -> Result<RngSnapshot, SnapshotError> {
        self.random_snapshot_before.parse()
    }
}

/// Equality ignores the diagnostic timestamp.
impl PartialEq for ActionRecord {
    fn eq(&self, other: &Self) -> bool {
        self.turn_number == other.turn_number
            && self.action_kind == other.action_kind
            && self.actor_kind == other.actor_kind
            && self.payload == other.payload
            && self.random_snapshot_before == other.random_snapshot_before
    }
}

impl Eq for ActionRecord {}

/// Summary shown in save pickers and used for completeness checks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryMetadata {
    /// Player turns taken
    pub turn_count: u64,
    /// Character name
    pub actor_name: String,
    /// Deepest level reached
    pub depth: u32,
    /// How the run stands
    pub outcome: Outcome,
    /// Turn at which recording began. Non-zero means the log is partial.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub recorded_from_turn: u64,
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

/// Hash of the live state right after an action was applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateCheckpoint {
    /// Index into `actions`
    pub action_index: usize,
    /// Hash of the state that action produced
    pub state_hash: StateDigest,
}

/// Complete replayable session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayRecord {
    /// Unique game id
    pub game_id: Uuid,
    /// Encoding version
    pub format_version: u32,
    /// State before the first action
    pub initial_state: GameState,
    /// Generator state that goes with `initial_state`. Records without it
    /// start from the seed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_random_snapshot: Option<String>,
    /// Session seed
    pub seed: Seed,
    /// Rule constants the session was played under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Rules>,
    /// Append-only action log
    pub actions: Vec<ActionRecord>,
    /// Summary
    pub summary_metadata: SummaryMetadata,
    /// Live state hashes for divergence detection
    #[serde(default)]
    pub checkpoints: Vec<StateCheckpoint>,
}

impl ReplayRecord {
    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, ReplayError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse from JSON text.
    pub fn from_json(text: &str) -> Result<Self, ReplayError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serialize to compact JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ReplayError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse from JSON bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ReplayError> {
        Ok(serde_json::from_slice(data)?)
    }
}

// =============================================================================
// TESTS
// =============================================================================
