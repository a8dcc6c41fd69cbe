//! Replay Reconstructor
//!
//! Rebuilds the state sequence of a session from its record: for each log
//! entry, restore the generator to the stored snapshot, rebuild the command
//! and apply it to the previous state.
//!
//! A record that stores its rule constants is replayed under those, whatever
//! rules the reconstructor was built with.
//!
//! Checksum mismatches are reported and reconstruction carries on. The first
//! fatal error stops it, and the states produced so far are still returned.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::core::hash::StateDigest;
use crate::core::rng::{DeterministicRng, RngSnapshot};
use crate::game::action::ActorKind;
use crate::game::rules::Rules;
use crate::game::state::GameState;
use crate::replay::error::{DeterminismViolation, ReplayError};
use crate::replay::factory::ActionFactory;
use crate::replay::record::{ReplayRecord, FORMAT_VERSION};

/// Outcome of a full reconstruction.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    /// `states[0]` is the initial state, `states[i]` follows action `i - 1`
    pub states: Vec<Arc<GameState>>,
    /// Checksum mismatches found along the way
    pub violations: Vec<DeterminismViolation>,
    /// Fatal error that stopped reconstruction early
    pub error: Option<ReplayError>,
    /// Stopped at the configured horizon rather than the end of the log
    pub truncated: bool,
}

impl Reconstruction {
    /// No checksum mismatches.
    pub fn is_trusted(&self) -> bool {
        self.violations.is_empty()
    }

    /// Every action was applied.
    pub fn is_complete(&self) -> bool {
        self.error.is_none() && !self.truncated
    }

    /// Last state produced.
    pub fn final_state(&self) -> Option<&Arc<GameState>> {
        self.states.last()
    }

    /// Number of actions applied.
    pub fn actions_applied(&self) -> usize {
        self.states.len().saturating_sub(1)
    }
}

/// Replays records against one rule set.
#[derive(Clone, Debug)]
pub struct Reconstructor {
    factory: ActionFactory,
    actions_per_turn: usize,
    horizon: Option<usize>,
}

impl Reconstructor {
    /// Reconstructor with one expected action per turn and no horizon.
    pub fn new(rules: Arc<Rules>) -> Self {
        Self {
            factory: ActionFactory::new(rules),
            actions_per_turn: 1,
            horizon: None,
        }
    }

    /// Reconstructor configured from engine settings.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(Arc::new(config.rules.clone()))
            .with_actions_per_turn(config.actions_per_turn)
            .with_horizon(config.turn_horizon)
    }

    /// Expected minimum actions per turn (`k` in the completeness check).
    pub fn with_actions_per_turn(mut self, k: usize) -> Self {
        self.actions_per_turn = k;
        self
    }

    /// Stop eager reconstruction after this many actions.
    pub fn with_horizon(mut self, horizon: Option<usize>) -> Self {
        self.horizon = horizon;
        self
    }

    /// Check that a record can be replayed at all.
    pub fn validate(&self, record: &ReplayRecord) -> Result<(), ReplayError> {
        if record.format_version != FORMAT_VERSION {
            return Err(ReplayError::UnsupportedVersion {
                found: record.format_version,
                supported: FORMAT_VERSION,
            });
        }

        let summary = &record.summary_metadata;
        if summary.recorded_from_turn > 0 {
            return Err(ReplayError::IncompleteLog(format!(
                "recording began at turn {}, not at game start",
                summary.recorded_from_turn
            )));
        }

        let logged = record.actions.len() as u64;
        if logged.saturating_mul(self.actions_per_turn as u64) < summary.turn_count {
            return Err(ReplayError::IncompleteLog(format!(
                "{} actions logged for {} turns ({} per turn expected)",
                logged, summary.turn_count, self.actions_per_turn
            )));
        }

        let mut last_turn = 0;
        let mut last_player_turn = 0;
        for (index, action) in record.actions.iter().enumerate() {
            if action.turn_number < last_turn {
                return Err(ReplayError::IncompleteLog(format!(
                    "action {} goes back to turn {} after turn {}",
                    index, action.turn_number, last_turn
                )));
            }
            if action.actor_kind == ActorKind::Player {
                if action.turn_number != last_player_turn + 1 {
                    return Err(ReplayError::IncompleteLog(format!(
                        "turn {} is followed by turn {} at action {}",
                        last_player_turn, action.turn_number, index
                    )));
                }
                last_player_turn = action.turn_number;
            }
            last_turn = action.turn_number;
        }

        Ok(())
    }

    /// Validate and return an incremental stepper over the record.
    pub fn stepper(&self, record: impl Into<Arc<ReplayRecord>>) -> Result<ReplayStepper, ReplayError> {
        let record = record.into();
        if let Err(e) = self.validate(&record) {
            warn!(game_id = %record.game_id, "replay refused: {}", e);
            return Err(e);
        }
        let factory = match &record.rules {
            Some(rules) if *rules != **self.factory.rules() => {
                info!(game_id = %record.game_id, "replaying under the rules stored in the record");
                ActionFactory::new(Arc::new(rules.clone()))
            }
            _ => self.factory.clone(),
        };
        Ok(ReplayStepper::new(record, factory))
    }

    /// Rebuild every state, up to the horizon.
    ///
    /// Returns `Err` only when the record is refused outright. Fatal errors
    /// mid-log are reported inside the [`Reconstruction`].
    pub fn reconstruct(&self, record: impl Into<Arc<ReplayRecord>>) -> Result<Reconstruction, ReplayError> {
        let mut stepper = self.stepper(record)?;
        let mut states = vec![stepper.current().clone()];
        let mut error = None;
        let mut truncated = false;

        loop {
            if let Some(limit) = self.horizon {
                if stepper.position() >= limit && !stepper.is_done() {
                    truncated = true;
                    break;
                }
            }
            match stepper.step() {
                Ok(Some(state)) => states.push(state),
                Ok(None) => break,
                Err(e) => {
                    error = Some(e);
                    break;
                }
            }
        }

        let reconstruction = Reconstruction {
            states,
            violations: stepper.violations().to_vec(),
            error,
            truncated,
        };
        info!(
            game_id = %stepper.record().game_id,
            applied = reconstruction.actions_applied(),
            trusted = reconstruction.is_trusted(),
            complete = reconstruction.is_complete(),
            "reconstruction finished"
        );
        Ok(reconstruction)
    }
}

/// Applies a record one action at a time.
#[derive(Debug)]
pub struct ReplayStepper {
    record: Arc<ReplayRecord>,
    factory: ActionFactory,
    rng: DeterministicRng,
    current: Arc<GameState>,
    next_index: usize,
    checkpoints: BTreeMap<usize, StateDigest>,
    violations: Vec<DeterminismViolation>,
    halted: Option<ReplayError>,
}

impl ReplayStepper {
    fn new(record: Arc<ReplayRecord>, factory: ActionFactory) -> Self {
        let mut rng = DeterministicRng::from_seed(&record.seed);
        // The generator before action 0; a bad one halts before any action runs
        let halted = record.initial_random_snapshot.as_ref().and_then(|text| {
            text.parse::<RngSnapshot>()
                .and_then(|snapshot| rng.restore(&snapshot))
                .err()
                .map(|source| ReplayError::RandomStateCorrupt {
                    action_index: 0,
                    turn: 0,
                    source,
                })
        });
        if let Some(e) = &halted {
            error!(game_id = %record.game_id, "replay halted: {}", e);
        }
        let current = Arc::new(record.initial_state.clone());
        let checkpoints = record
            .checkpoints
            .iter()
            .map(|c| (c.action_index, c.state_hash))
            .collect();
        Self {
            record,
            factory,
            rng,
            current,
            next_index: 0,
            checkpoints,
            violations: Vec::new(),
            halted,
        }
    }

    /// Apply the next action.
    ///
    /// `Ok(None)` at the end of the log. After a fatal error every further
    /// call returns the same error.
    pub fn step(&mut self) -> Result<Option<Arc<GameState>>, ReplayError> {
        if let Some(e) = &self.halted {
            return Err(e.clone());
        }
        let index = self.next_index;
        let Some(turn) = self.record.actions.get(index).map(|a| a.turn_number) else {
            return Ok(None);
        };

        match self.apply_entry(index) {
            Ok(state) => {
                self.current = state.clone();
                self.next_index += 1;
                Ok(Some(state))
            }
            Err(e) => {
                error!(index, turn, "replay halted: {}", e);
                self.halted = Some(e.clone());
                Err(e)
            }
        }
    }

    fn apply_entry(&mut self, index: usize) -> Result<Arc<GameState>, ReplayError> {
        let entry = &self.record.actions[index];

        entry
            .random_snapshot()
            .and_then(|snapshot| self.rng.restore(&snapshot))
            .map_err(|source| ReplayError::RandomStateCorrupt {
                action_index: index,
                turn: entry.turn_number,
                source,
            })?;
        let command = self.factory.build_record(entry)?;

        // Replay never performs the detached side effects of an action
        let next = command.apply(&self.current, &mut self.rng).into_state();
        debug!(index, turn = entry.turn_number, kind = %entry.action_kind, "action replayed");

        if let Some(expected) = self.checkpoints.get(&index) {
            let computed = next
                .digest()
                .map_err(|e| ReplayError::StateEncoding(e.to_string()))?;
            if computed != *expected {
                let violation = DeterminismViolation {
                    action_index: index,
                    turn: entry.turn_number,
                    action_kind: entry.action_kind.clone(),
                    expected: *expected,
                    computed,
                };
                error!(game_id = %self.record.game_id, "{}", violation);
                self.violations.push(violation);
            }
        }

        Ok(Arc::new(next))
    }

    /// Most recently produced state.
    pub fn current(&self) -> &Arc<GameState> {
        &self.current
    }

    /// Actions applied so far.
    pub fn position(&self) -> usize {
        self.next_index
    }

    /// Actions in the log.
    pub fn len(&self) -> usize {
        self.record.actions.len()
    }

    /// Log has no actions.
    pub fn is_empty(&self) -> bool {
        self.record.actions.is_empty()
    }

    /// No further state can be produced.
    pub fn is_done(&self) -> bool {
        self.halted.is_some() || self.next_index >= self.record.actions.len()
    }

    /// Fatal error, if one occurred.
    pub fn halted(&self) -> Option<&ReplayError> {
        self.halted.as_ref()
    }

    /// Checksum mismatches so far.
    pub fn violations(&self) -> &[DeterminismViolation] {
        &self.violations
    }

    /// Record being replayed.
    pub fn record(&self) -> &ReplayRecord {
        &self.record
    }

    /// Replay generator. After the last action it stands where the live
    /// generator stood, so a resumed session can keep drawing from it.
    pub fn rng(&self) -> &DeterministicRng {
        &self.rng
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::{Seed, SnapshotError};
    use crate::game::action::Action;
    use crate::game::level::Level;
    use crate::game::state::{Direction, Outcome, Player, Position};
    use crate::replay::record::SummaryMetadata;
    use crate::replay::recorder::ActionRecorder;
    use serde_json::json;
    use uuid::Uuid;

    fn initial() -> GameState {
        GameState::new(Player::new("Ada", Position::new(5, 5), 16, 900), Level::open_room(12, 10))
    }

    /// Play actions the way a live session does and return the record.
    fn play(actions: &[Action]) -> ReplayRecord {
        let rules = Arc::new(Rules::default());
        let factory = ActionFactory::new(rules);
        let seed = Seed::from("test-seed");
        let mut rng = DeterministicRng::from_seed(&seed);
        let mut recorder = ActionRecorder::new(Uuid::nil(), seed, initial(), &rng);
        let mut state = initial();
        let mut turn = 0;

        for action in actions {
            if action.kind().actor() == ActorKind::Player {
                turn += 1;
            }
            recorder.record_action(turn, action, &rng).unwrap();
            state = factory.bind(action.clone()).apply(&state, &mut rng).into_state();
            let index = recorder.log().len() - 1;
            recorder.checkpoint(index, state.digest().unwrap()).unwrap();
        }

        recorder.finish(SummaryMetadata {
            turn_count: turn,
            actor_name: "Ada".into(),
            depth: state.depth,
            outcome: state.outcome,
            recorded_from_turn: 0,
        })
    }

    fn reconstructor() -> Reconstructor {
        Reconstructor::new(Arc::new(Rules::default()))
    }

    #[test]
    fn test_full_reconstruction_matches_live() {
        let record = play(&[
            Action::step(Direction::Right),
            Action::Rest,
            Action::step(Direction::Down),
        ]);
        let result = reconstructor().reconstruct(record).unwrap();
        assert!(result.is_complete());
        assert!(result.is_trusted());
        assert_eq!(result.states.len(), 4);
        assert_eq!(result.final_state().unwrap().player.position, Position::new(6, 6));
    }

    #[test]
    fn test_empty_log_yields_initial_state() {
        let record = play(&[]);
        let result = reconstructor().reconstruct(record).unwrap();
        assert_eq!(result.states.len(), 1);
        assert_eq!(*result.states[0], initial());
    }

    #[test]
    fn test_short_log_is_refused() {
        let mut record = play(&[Action::Rest, Action::Rest]);
        record.summary_metadata.turn_count = 5;
        assert!(matches!(reconstructor().reconstruct(record), Err(ReplayError::IncompleteLog(_))));
    }

    #[test]
    fn test_actions_per_turn_factor() {
        let record = play(&[Action::Rest, Action::Rest]);
        let strict = reconstructor().with_actions_per_turn(2);
        assert!(strict.validate(&record).is_ok());

        let mut record = record;
        record.summary_metadata.turn_count = 5;
        assert!(strict.validate(&record).is_err());
    }

    #[test]
    fn test_turn_gap_is_refused() {
        let mut record = play(&[Action::Rest, Action::Rest, Action::Rest]);
        record.actions.remove(1);
        record.summary_metadata.turn_count = 2;
        assert!(matches!(reconstructor().validate(&record), Err(ReplayError::IncompleteLog(_))));
    }

    #[test]
    fn test_late_recorder_is_refused() {
        let mut record = play(&[Action::Rest]);
        record.summary_metadata.recorded_from_turn = 3;
        assert!(matches!(reconstructor().validate(&record), Err(ReplayError::IncompleteLog(_))));
    }

    #[test]
    fn test_future_format_is_refused() {
        let mut record = play(&[Action::Rest]);
        record.format_version = FORMAT_VERSION + 1;
        assert!(matches!(
            reconstructor().validate(&record),
            Err(ReplayError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn test_unknown_kind_halts_with_partial_states() {
        let mut record = play(&[Action::Rest, Action::Rest, Action::Rest]);
        record.actions[1].action_kind = "TELEPORT".into();
        let result = reconstructor().reconstruct(record).unwrap();
        assert_eq!(result.states.len(), 2);
        assert_eq!(result.error, Some(ReplayError::UnknownActionKind("TELEPORT".into())));
    }

    #[test]
    fn test_corrupt_snapshot_halts_at_that_action() {
        let mut record = play(&[Action::Rest, Action::Rest, Action::Rest]);
        record.actions[2].random_snapshot_before = RngSnapshot::from_parts(1, [0, 0]).to_string();
        let result = reconstructor().reconstruct(record).unwrap();
        assert_eq!(result.states.len(), 3);
        assert!(matches!(
            result.error,
            Some(ReplayError::RandomStateCorrupt { action_index: 2, turn: 3, .. })
        ));
    }

    #[test]
    fn test_foreign_snapshot_halts_at_that_action() {
        let mut record = play(&[Action::Rest, Action::Rest, Action::Rest]);
        record.actions[1].random_snapshot_before = "pcg64/1:00112233445566778899aabbccddeeff".into();
        let result = reconstructor().reconstruct(record).unwrap();
        assert_eq!(result.states.len(), 2);
        assert!(matches!(
            result.error,
            Some(ReplayError::RandomStateCorrupt {
                action_index: 1,
                turn: 2,
                source: SnapshotError::Malformed(_),
            })
        ));
    }

    #[test]
    fn test_bad_initial_snapshot_halts_before_first_action() {
        let mut record = play(&[Action::Rest]);
        record.initial_random_snapshot = Some("xs128p/1:".into());
        let result = reconstructor().reconstruct(record).unwrap();
        assert_eq!(result.states.len(), 1);
        assert!(matches!(
            result.error,
            Some(ReplayError::RandomStateCorrupt { action_index: 0, turn: 0, .. })
        ));
    }

    #[test]
    fn test_stepper_starts_from_initial_snapshot() {
        let mut rng = DeterministicRng::new(3);
        rng.next_u64();
        let recorder = ActionRecorder::new(Uuid::nil(), Seed::from(3), initial(), &rng);
        let record = recorder.finish(SummaryMetadata {
            turn_count: 0,
            actor_name: "Ada".into(),
            depth: 1,
            outcome: Outcome::Ongoing,
            recorded_from_turn: 0,
        });
        let stepper = reconstructor().stepper(record).unwrap();
        assert_eq!(stepper.rng().snapshot(), rng.snapshot());
    }

    #[test]
    fn test_stored_rules_override_reconstructor_rules() {
        let rules = Rules {
            hunger_per_turn: 5,
            ..Rules::default()
        };
        let mut record = play(&[Action::Rest, Action::Rest]);
        record.rules = Some(rules);

        let result = reconstructor().reconstruct(record).unwrap();
        assert_eq!(result.final_state().unwrap().player.nutrition, 890);
    }

    #[test]
    fn test_checksum_mismatch_reported_and_continues() {
        let mut record = play(&[Action::Rest, Action::Rest, Action::Rest]);
        record.checkpoints[0].state_hash = record.initial_state.digest().unwrap();
        let result = reconstructor().reconstruct(record).unwrap();
        assert!(result.is_complete());
        assert!(!result.is_trusted());
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].action_index, 0);
        assert_eq!(result.states.len(), 4);
    }

    #[test]
    fn test_tampered_payload_is_detected_by_checkpoint() {
        let mut record = play(&[Action::step(Direction::Right), Action::step(Direction::Right)]);
        record.actions[1].payload = json!({"direction": "left"});
        let result = reconstructor().reconstruct(record).unwrap();
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].action_index, 1);
    }

    #[test]
    fn test_horizon_truncates() {
        let record = play(&[Action::Rest, Action::Rest, Action::Rest, Action::Rest]);
        let result = reconstructor().with_horizon(Some(2)).reconstruct(record).unwrap();
        assert!(result.truncated);
        assert!(!result.is_complete());
        assert_eq!(result.actions_applied(), 2);
    }

    #[test]
    fn test_stepper_is_sticky_after_error() {
        let mut record = play(&[Action::Rest, Action::Rest]);
        record.actions[0].payload = json!({"bogus": 1});
        let mut stepper = reconstructor().stepper(record).unwrap();
        let first = stepper.step().unwrap_err();
        assert_eq!(stepper.step().unwrap_err(), first);
        assert!(stepper.is_done());
        assert_eq!(stepper.position(), 0);
    }
}
