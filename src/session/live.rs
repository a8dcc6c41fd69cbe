//! Live Session
//!
//! Owns the authoritative state of one game in progress, its random source
//! and its recorder. Every action goes through [`LiveSession::dispatch`],
//! which records it, applies it and hands the next state back.
//!
//! Saves run as detached tasks. Their outcome is reported on a notification
//! channel and never touches the game state.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::core::rng::{DeterministicRng, Seed};
use crate::game::action::{Action, ActorKind, Applied, PendingIo, Recording};
use crate::game::rules::{self, Rules};
use crate::game::state::GameState;
use crate::replay::error::ReplayError;
use crate::replay::factory::ActionFactory;
use crate::replay::reconstruct::Reconstructor;
use crate::replay::record::{ReplayRecord, SummaryMetadata};
use crate::replay::recorder::{ActionRecorder, Recorded};
use crate::session::store::ReplayStore;

/// How the map is drawn. Debug-only, not part of the game state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RenderMode {
    /// Classic characters.
    #[default]
    Glyphs,
    /// Tile graphics.
    Tiles,
}

/// Presentation toggles driven by exempt debug actions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewSettings {
    /// Current render mode
    pub render_mode: RenderMode,
    /// Whole level visible
    pub map_revealed: bool,
}

/// Outcome of a detached save, delivered out of band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveNotice {
    /// Record written.
    Saved {
        /// Game id
        game_id: Uuid,
        /// Player turn at save time
        turn: u64,
        /// Actions in the saved log
        actions: usize,
    },
    /// Store reported an error.
    Failed {
        /// Game id
        game_id: Uuid,
        /// Player turn at save time
        turn: u64,
        /// Store error message
        reason: String,
    },
    /// Save could not be attempted.
    Skipped {
        /// Game id
        game_id: Uuid,
        /// Player turn at save time
        turn: u64,
        /// Why
        reason: String,
    },
}

/// One game in progress.
pub struct LiveSession {
    rules: Arc<Rules>,
    factory: ActionFactory,
    rng: DeterministicRng,
    state: GameState,
    recorder: ActionRecorder,
    turn: u64,
    checkpoint_interval: usize,
    autosave_interval: u64,
    store: Option<Arc<dyn ReplayStore>>,
    notices: mpsc::UnboundedSender<SaveNotice>,
    view: ViewSettings,
    dropped_records: u64,
}

impl LiveSession {
    /// Start a new game on a generated first level.
    pub fn new(
        actor_name: &str,
        seed: Seed,
        config: &EngineConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SaveNotice>) {
        let rules = Arc::new(config.rules.clone());
        let mut rng = DeterministicRng::from_seed(&seed);
        let initial = rules::new_game(actor_name, &rules, &mut rng);
        let recorder =
            ActionRecorder::new(Uuid::new_v4(), seed, initial.clone(), &rng).with_rules(config.rules.clone());
        Self::assemble(initial, rng, recorder, 0, rules, config)
    }

    /// Start a game from a prepared state.
    pub fn from_state(
        initial: GameState,
        seed: Seed,
        config: &EngineConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SaveNotice>) {
        let rules = Arc::new(config.rules.clone());
        let rng = DeterministicRng::from_seed(&seed);
        let recorder =
            ActionRecorder::new(Uuid::new_v4(), seed, initial.clone(), &rng).with_rules(config.rules.clone());
        Self::assemble(initial, rng, recorder, 0, rules, config)
    }

    /// Continue a saved game where its log ends.
    ///
    /// The existing log is replayed to rebuild the state and the random
    /// source, and new actions are appended to it. Rules stored in the record
    /// take precedence over the configured ones.
    pub fn resume(
        record: ReplayRecord,
        config: &EngineConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SaveNotice>), ReplayError> {
        let rules = Arc::new(record.rules.clone().unwrap_or_else(|| config.rules.clone()));
        let reconstructor = Reconstructor::new(rules.clone()).with_actions_per_turn(config.actions_per_turn);
        let mut stepper = reconstructor.stepper(record.clone())?;
        while stepper.step()?.is_some() {}
        if !stepper.violations().is_empty() {
            warn!(
                game_id = %record.game_id,
                violations = stepper.violations().len(),
                "resumed game diverged from its checkpoints"
            );
        }

        let state = GameState::clone(stepper.current());
        let rng = stepper.rng().clone();
        let turn = record.summary_metadata.turn_count;
        let recorder = ActionRecorder::resume(&record);
        info!(game_id = %record.game_id, turn, "game resumed");
        Ok(Self::assemble(state, rng, recorder, turn, rules, config))
    }

    fn assemble(
        state: GameState,
        rng: DeterministicRng,
        recorder: ActionRecorder,
        turn: u64,
        rules: Arc<Rules>,
        config: &EngineConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SaveNotice>) {
        let (notices, rx) = mpsc::unbounded_channel();
        info!(
            game_id = %recorder.game_id(),
            actor = %state.player.name,
            depth = state.depth,
            "session started"
        );
        let session = Self {
            factory: ActionFactory::new(rules.clone()),
            rules,
            rng,
            state,
            recorder,
            turn,
            checkpoint_interval: config.checkpoint_interval,
            autosave_interval: config.autosave_interval,
            store: None,
            notices,
            view: ViewSettings::default(),
            dropped_records: 0,
        };
        (session, rx)
    }

    /// Attach a store for saves.
    pub fn with_store(mut self, store: Arc<dyn ReplayStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Record and apply one action, returning the new state.
    ///
    /// Recording failures are logged and counted; play continues.
    pub fn dispatch(&mut self, action: Action) -> &GameState {
        let kind = action.kind();
        if kind.recording() == Recording::Exempt {
            self.apply_view(&action);
            return &self.state;
        }

        let actor = kind.actor();
        if actor == ActorKind::Player {
            self.turn += 1;
        }

        let recorded = match self.recorder.record_action(self.turn, &action, &self.rng) {
            Ok(Recorded::Appended(index)) => Some(index),
            Ok(Recorded::Exempt) => None,
            Err(e) => {
                warn!(turn = self.turn, kind = %kind, "action not recorded: {}", e);
                self.dropped_records += 1;
                None
            }
        };

        let moves_before = self.state.moves;
        let was_finished = self.state.is_finished();
        debug!(turn = self.turn, action = %action, "dispatch");

        let pending = match self.factory.bind(action).apply(&self.state, &mut self.rng) {
            Applied::Ready(next) => {
                self.state = next;
                None
            }
            Applied::Pending { state, io } => {
                self.state = state;
                Some(io)
            }
        };

        if let Some(index) = recorded {
            self.checkpoint(index);
        }
        if !was_finished && self.state.is_finished() {
            info!(
                game_id = %self.recorder.game_id(),
                outcome = ?self.state.outcome,
                turn = self.turn,
                "run ended"
            );
        }
        if let Some(io) = pending {
            self.run_io(io);
        }

        if actor == ActorKind::Player {
            if self.rules.wanderer_due(moves_before, self.state.moves) {
                self.dispatch(Action::SpawnWanderer);
            }
            if self.autosave_interval > 0 && self.turn % self.autosave_interval == 0 {
                self.run_io(PendingIo::Save);
            }
        }

        &self.state
    }

    fn apply_view(&mut self, action: &Action) {
        match action {
            Action::ToggleRenderMode => {
                self.view.render_mode = match self.view.render_mode {
                    RenderMode::Glyphs => RenderMode::Tiles,
                    RenderMode::Tiles => RenderMode::Glyphs,
                };
            }
            Action::RevealMap => self.view.map_revealed = !self.view.map_revealed,
            _ => {}
        }
        debug!(view = ?self.view, "view toggled");
    }

    fn checkpoint(&mut self, index: usize) {
        if self.checkpoint_interval == 0 || (index + 1) % self.checkpoint_interval != 0 {
            return;
        }
        match self.state.digest() {
            Ok(digest) => {
                if let Err(e) = self.recorder.checkpoint(index, digest) {
                    warn!(index, "checkpoint not stored: {}", e);
                }
            }
            Err(e) => warn!(index, "cannot hash state: {}", e),
        }
    }

    fn run_io(&self, io: PendingIo) {
        match io {
            PendingIo::Save => self.spawn_save(),
        }
    }

    fn spawn_save(&self) {
        let game_id = self.recorder.game_id();
        let turn = self.turn;
        let tx = self.notices.clone();

        let Some(store) = self.store.clone() else {
            let _ = tx.send(SaveNotice::Skipped {
                game_id,
                turn,
                reason: "no store attached".into(),
            });
            return;
        };

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(%game_id, turn, "no async runtime, save skipped");
                let _ = tx.send(SaveNotice::Skipped {
                    game_id,
                    turn,
                    reason: "no async runtime".into(),
                });
                return;
            }
        };

        let record = self.snapshot();
        handle.spawn(async move {
            let actions = record.actions.len();
            let notice = match store.save(&record).await {
                Ok(()) => {
                    info!(%game_id, turn, actions, "game saved");
                    SaveNotice::Saved { game_id, turn, actions }
                }
                Err(e) => {
                    warn!(%game_id, turn, "save failed: {}", e);
                    SaveNotice::Failed {
                        game_id,
                        turn,
                        reason: e.to_string(),
                    }
                }
            };
            let _ = tx.send(notice);
        });
    }

    fn summary(&self) -> SummaryMetadata {
        SummaryMetadata {
            turn_count: self.turn,
            actor_name: self.state.player.name.clone(),
            depth: self.state.depth,
            outcome: self.state.outcome,
            recorded_from_turn: self.recorder.recorded_from_turn(),
        }
    }

    /// Replay record of the game so far.
    pub fn snapshot(&self) -> ReplayRecord {
        self.recorder.to_record(self.summary())
    }

    /// End the session and return its final record.
    pub fn finish(self) -> ReplayRecord {
        let summary = self.summary();
        info!(
            game_id = %self.recorder.game_id(),
            turns = summary.turn_count,
            actions = self.recorder.log().len(),
            dropped = self.dropped_records,
            "session finished"
        );
        self.recorder.finish(summary)
    }

    /// Authoritative state.
    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Player turns taken.
    pub fn turn(&self) -> u64 {
        self.turn
    }

    /// Game id.
    pub fn game_id(&self) -> Uuid {
        self.recorder.game_id()
    }

    /// Debug view toggles.
    pub fn view(&self) -> ViewSettings {
        self.view
    }

    /// Session random source.
    pub fn rng(&self) -> &DeterministicRng {
        &self.rng
    }

    /// Recorder, read-only.
    pub fn recorder(&self) -> &ActionRecorder {
        &self.recorder
    }

    /// Actions that could not be recorded.
    pub fn dropped_records(&self) -> u64 {
        self.dropped_records
    }

    /// Rule set in use.
    pub fn rules(&self) -> &Arc<Rules> {
        &self.rules
    }
}

// =============================================================================
// TESTS
// =============================================================================
