//! Action Recorder
//!
//! Captures every state-affecting action, together with the generator state
//! it is about to consume, before the action runs. The log only ever grows.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::core::hash::StateDigest;
use crate::core::rng::{DeterministicRng, Seed};
use crate::game::action::{Action, ActionKind, ActorKind, Recording};
use crate::game::rules::Rules;
use crate::game::state::GameState;
use crate::replay::record::{
    ActionRecord, ReplayRecord, StateCheckpoint, SummaryMetadata, FORMAT_VERSION,
};

/// Clock used for diagnostic timestamps, in ms since the epoch.
pub type Clock = fn() -> i64;

fn wall_clock() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Errors raised by the recorder. The live session logs these and keeps
/// playing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecorderError {
    /// The session has ended and the log is frozen.
    #[error("recorder is sealed")]
    Sealed,

    /// Turn numbers must never go backwards.
    #[error("turn {got} recorded after turn {last}")]
    TurnRegressed {
        /// Last recorded turn
        last: u64,
        /// Offending turn
        got: u64,
    },

    /// Checkpoint refers to an action that is not in the log.
    #[error("checkpoint for action {index} but log holds {len}")]
    CheckpointOutOfRange {
        /// Requested index
        index: usize,
        /// Log length
        len: usize,
    },
}

/// What happened to a `record` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    /// Appended at this index.
    Appended(usize),
    /// Kind is on the exemption list; nothing was written.
    Exempt,
}

/// Append-only list of action records.
///
/// No method hands out mutable access to an existing entry.
#[derive(Debug, Clone, Default)]
pub struct ActionLog {
    entries: Vec<ActionRecord>,
}

impl ActionLog {
    fn append(&mut self, record: ActionRecord) -> usize {
        self.entries.push(record);
        self.entries.len() - 1
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read-only view of all entries.
    pub fn as_slice(&self) -> &[ActionRecord] {
        &self.entries
    }

    /// Entry by index.
    pub fn get(&self, index: usize) -> Option<&ActionRecord> {
        self.entries.get(index)
    }

    /// Most recent entry.
    pub fn last(&self) -> Option<&ActionRecord> {
        self.entries.last()
    }

    /// Iterate in log order.
    pub fn iter(&self) -> std::slice::Iter<'_, ActionRecord> {
        self.entries.iter()
    }
}

/// Recorder for one live session.
#[derive(Debug, Clone)]
pub struct ActionRecorder {
    game_id: Uuid,
    seed: Seed,
    initial_state: Arc<GameState>,
    initial_snapshot: Option<String>,
    rules: Option<Rules>,
    log: ActionLog,
    checkpoints: Vec<StateCheckpoint>,
    recorded_from_turn: u64,
    sealed: bool,
    clock: Clock,
}

impl ActionRecorder {
    /// Start recording a session from its initial state and the generator
    /// that will drive it.
    pub fn new(game_id: Uuid, seed: Seed, initial_state: GameState, rng: &DeterministicRng) -> Self {
        Self {
            game_id,
            seed,
            initial_state: Arc::new(initial_state),
            initial_snapshot: Some(rng.snapshot().to_string()),
            rules: None,
            log: ActionLog::default(),
            checkpoints: Vec::new(),
            recorded_from_turn: 0,
            sealed: false,
            clock: wall_clock,
        }
    }

    /// Continue appending to a saved record.
    pub fn resume(record: &ReplayRecord) -> Self {
        Self {
            game_id: record.game_id,
            seed: record.seed.clone(),
            initial_state: Arc::new(record.initial_state.clone()),
            initial_snapshot: record.initial_random_snapshot.clone(),
            rules: record.rules.clone(),
            log: ActionLog {
                entries: record.actions.clone(),
            },
            checkpoints: record.checkpoints.clone(),
            recorded_from_turn: record.summary_metadata.recorded_from_turn,
            sealed: false,
            clock: wall_clock,
        }
    }

    /// Recorder attached after the session had already run `turn` turns.
    /// Records it produces are flagged as partial.
    pub fn attached_at(mut self, turn: u64) -> Self {
        self.recorded_from_turn = turn;
        self
    }

    /// Store the rule constants the session plays under.
    pub fn with_rules(mut self, rules: Rules) -> Self {
        self.rules = Some(rules);
        self
    }

    /// Replace the timestamp source.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Log an action about to be applied.
    ///
    /// Call this unconditionally, before the action runs, even when the
    /// action will turn out to be a no-op. The generator is only read.
    pub fn record(
        &mut self,
        turn_number: u64,
        kind: ActionKind,
        actor: ActorKind,
        payload: Value,
        rng: &DeterministicRng,
    ) -> Result<Recorded, RecorderError> {
        if kind.recording() == Recording::Exempt {
            return Ok(Recorded::Exempt);
        }
        if self.sealed {
            return Err(RecorderError::Sealed);
        }
        if let Some(last) = self.log.last() {
            if turn_number < last.turn_number {
                return Err(RecorderError::TurnRegressed {
                    last: last.turn_number,
                    got: turn_number,
                });
            }
        }

        let index = self.log.append(ActionRecord {
            turn_number,
            timestamp: (self.clock)(),
            action_kind: kind.as_str().to_string(),
            actor_kind: actor,
            payload,
            random_snapshot_before: rng.snapshot().to_string(),
        });
        debug!(index, turn = turn_number, kind = %kind, "action recorded");
        Ok(Recorded::Appended(index))
    }

    /// [`Self::record`] for a typed action.
    pub fn record_action(
        &mut self,
        turn_number: u64,
        action: &Action,
        rng: &DeterministicRng,
    ) -> Result<Recorded, RecorderError> {
        let kind = action.kind();
        self.record(turn_number, kind, kind.actor(), action.payload(), rng)
    }

    /// Store the hash of the state produced by the action at `action_index`.
    pub fn checkpoint(&mut self, action_index: usize, state_hash: StateDigest) -> Result<(), RecorderError> {
        if self.sealed {
            return Err(RecorderError::Sealed);
        }
        if action_index >= self.log.len() {
            return Err(RecorderError::CheckpointOutOfRange {
                index: action_index,
                len: self.log.len(),
            });
        }
        self.checkpoints.push(StateCheckpoint { action_index, state_hash });
        Ok(())
    }

    /// Read-only log.
    pub fn log(&self) -> &ActionLog {
        &self.log
    }

    /// State before the first action.
    pub fn initial_state(&self) -> &GameState {
        &self.initial_state
    }

    /// Game id.
    pub fn game_id(&self) -> Uuid {
        self.game_id
    }

    /// Turn at which recording began.
    pub fn recorded_from_turn(&self) -> u64 {
        self.recorded_from_turn
    }

    /// Frozen?
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Freeze the log. Further `record` calls fail.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Copy of the session so far as a replay record.
    pub fn to_record(&self, mut summary: SummaryMetadata) -> ReplayRecord {
        summary.recorded_from_turn = self.recorded_from_turn;
        ReplayRecord {
            game_id: self.game_id,
            format_version: FORMAT_VERSION,
            initial_state: GameState::clone(&self.initial_state),
            initial_random_snapshot: self.initial_snapshot.clone(),
            seed: self.seed.clone(),
            rules: self.rules.clone(),
            actions: self.log.as_slice().to_vec(),
            summary_metadata: summary,
            checkpoints: self.checkpoints.clone(),
        }
    }

    /// Seal and produce the final record.
    pub fn finish(mut self, summary: SummaryMetadata) -> ReplayRecord {
        self.seal();
        self.to_record(summary)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::level::Level;
    use crate::game::state::{Direction, Outcome, Player, Position};

    fn fixed_clock() -> i64 {
        42
    }

    fn recorder() -> ActionRecorder {
        let state = GameState::new(Player::new("Ada", Position::new(2, 2), 10, 100), Level::open_room(6, 6));
        ActionRecorder::new(Uuid::nil(), Seed::from(7), state, &DeterministicRng::new(7)).with_clock(fixed_clock)
    }

    fn summary(turns: u64) -> SummaryMetadata {
        SummaryMetadata {
            turn_count: turns,
            actor_name: "Ada".into(),
            depth: 1,
            outcome: Outcome::Ongoing,
            recorded_from_turn: 0,
        }
    }

    #[test]
    fn test_records_snapshot_before_use() {
        let mut rec = recorder();
        let mut rng = DeterministicRng::new(7);
        let expected = rng.snapshot();

        let outcome = rec.record_action(1, &Action::step(Direction::Right), &rng).unwrap();
        assert_eq!(outcome, Recorded::Appended(0));
        rng.next_u64();

        let entry = rec.log().get(0).unwrap();
        assert_eq!(entry.random_snapshot_before, expected.to_string());
        assert_eq!(entry.action_kind, "MOVE");
        assert_eq!(entry.timestamp, 42);
    }

    #[test]
    fn test_exempt_kinds_are_not_logged() {
        let mut rec = recorder();
        let rng = DeterministicRng::new(7);
        assert_eq!(rec.record_action(1, &Action::RevealMap, &rng), Ok(Recorded::Exempt));
        assert_eq!(rec.record_action(1, &Action::ToggleRenderMode, &rng), Ok(Recorded::Exempt));
        assert!(rec.log().is_empty());
    }

    #[test]
    fn test_turn_regression_rejected() {
        let mut rec = recorder();
        let rng = DeterministicRng::new(7);
        rec.record_action(3, &Action::Rest, &rng).unwrap();
        assert_eq!(
            rec.record_action(2, &Action::Rest, &rng),
            Err(RecorderError::TurnRegressed { last: 3, got: 2 })
        );
        // Same turn is fine (system actions share the player's turn)
        assert!(rec.record_action(3, &Action::SpawnWanderer, &rng).is_ok());
        assert_eq!(rec.log().len(), 2);
    }

    #[test]
    fn test_sealed_recorder_refuses() {
        let mut rec = recorder();
        let rng = DeterministicRng::new(7);
        rec.seal();
        assert_eq!(rec.record_action(1, &Action::Rest, &rng), Err(RecorderError::Sealed));
    }

    #[test]
    fn test_checkpoint_bounds() {
        let mut rec = recorder();
        let digest = rec.initial_state().digest().unwrap();
        assert!(matches!(
            rec.checkpoint(0, digest),
            Err(RecorderError::CheckpointOutOfRange { index: 0, len: 0 })
        ));
        rec.record_action(1, &Action::Rest, &DeterministicRng::new(1)).unwrap();
        assert!(rec.checkpoint(0, digest).is_ok());
    }

    #[test]
    fn test_finish_builds_record() {
        let mut rec = recorder();
        let rng = DeterministicRng::new(7);
        rec.record_action(1, &Action::Rest, &rng).unwrap();
        let record = rec.attached_at(0).finish(summary(1));
        assert_eq!(record.actions.len(), 1);
        assert_eq!(record.format_version, FORMAT_VERSION);
        assert_eq!(record.seed, Seed::Number(7));
    }

    #[test]
    fn test_resume_keeps_existing_entries() {
        let mut rec = recorder();
        let rng = DeterministicRng::new(7);
        rec.record_action(1, &Action::Rest, &rng).unwrap();
        let saved = rec.finish(summary(1));

        let mut resumed = ActionRecorder::resume(&saved);
        assert_eq!(resumed.game_id(), Uuid::nil());
        assert_eq!(resumed.record_action(2, &Action::Rest, &rng), Ok(Recorded::Appended(1)));
        assert_eq!(
            resumed.record_action(1, &Action::Rest, &rng),
            Err(RecorderError::TurnRegressed { last: 2, got: 1 })
        );
    }

    #[test]
    fn test_record_carries_session_start() {
        let mut rng = DeterministicRng::new(7);
        rng.next_u64();
        let state = GameState::new(Player::new("Ada", Position::new(2, 2), 10, 100), Level::open_room(6, 6));
        let rec = ActionRecorder::new(Uuid::nil(), Seed::from(7), state, &rng).with_rules(Rules::default());

        let record = rec.finish(summary(0));
        assert_eq!(record.initial_random_snapshot, Some(rng.snapshot().to_string()));
        assert_eq!(record.rules, Some(Rules::default()));

        let resumed = ActionRecorder::resume(&record).finish(summary(0));
        assert_eq!(resumed.initial_random_snapshot, record.initial_random_snapshot);
        assert_eq!(resumed.rules, record.rules);
    }

    #[test]
    fn test_late_attachment_is_flagged() {
        let rec = recorder().attached_at(10);
        assert_eq!(rec.to_record(summary(12)).summary_metadata.recorded_from_turn, 10);
    }
}
