//! Replay Debugger
//!
//! Cursor over a reconstructed session for step-through inspection.
//!
//! States are materialized lazily as the cursor moves forward and cached
//! per turn. Moving backward, or jumping to a turn already visited, only
//! reads the cache and never draws from the generator again.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::game::state::GameState;
use crate::replay::error::{DeterminismViolation, ReplayError};
use crate::replay::reconstruct::{Reconstructor, ReplayStepper};
use crate::replay::record::ReplayRecord;

/// Debugger lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebuggerState {
    /// No record loaded.
    Closed,
    /// Record loaded, cursor on the initial state.
    Ready,
    /// Cursor has moved at least once.
    Stepping,
}

/// Errors returned by debugger commands.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DebuggerError {
    /// No record is open.
    #[error("no replay is open")]
    NotOpen,

    /// Already on the initial state.
    #[error("already at the first turn")]
    AtStart,

    /// No further state can be produced.
    #[error("already at the last turn ({0})")]
    AtEnd(usize),

    /// Requested turn does not exist.
    #[error("turn {requested} is out of range (last reachable turn: {last})")]
    TurnOutOfRange {
        /// Requested turn
        requested: usize,
        /// Last turn that could be materialized
        last: usize,
    },

    /// Reconstruction refused or halted.
    #[error(transparent)]
    Replay(#[from] ReplayError),
}

/// What an inspection UI shows after each command.
#[derive(Debug, Clone)]
pub struct DebuggerView {
    /// State at the cursor
    pub state: Arc<GameState>,
    /// Cursor position: number of actions applied
    pub turn: usize,
    /// Turn number of the action that produced this state (0 initially)
    pub turn_number: u64,
    /// Stepping forward can succeed
    pub has_next: bool,
    /// Stepping backward can succeed
    pub has_previous: bool,
    /// No checksum mismatch seen so far
    pub trusted: bool,
}

struct Cursor {
    stepper: ReplayStepper,
    cache: Vec<Arc<GameState>>,
    position: usize,
    state: DebuggerState,
}

impl Cursor {
    fn view(&self) -> DebuggerView {
        let turn_number = match self.position {
            0 => 0,
            n => self
                .stepper
                .record()
                .actions
                .get(n - 1)
                .map(|a| a.turn_number)
                .unwrap_or(0),
        };
        DebuggerView {
            state: self.cache[self.position].clone(),
            turn: self.position,
            turn_number,
            has_next: self.position + 1 < self.cache.len() || !self.stepper.is_done(),
            has_previous: self.position > 0,
            trusted: self.stepper.violations().is_empty(),
        }
    }

    /// Materialize one more state at the end of the cache.
    fn extend(&mut self) -> Result<bool, ReplayError> {
        match self.stepper.step()? {
            Some(state) => {
                self.cache.push(state);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Step-through debugger over one replay record at a time.
pub struct ReplayDebugger {
    reconstructor: Reconstructor,
    cursor: Option<Cursor>,
}

impl ReplayDebugger {
    /// Debugger that replays with the given reconstructor.
    pub fn new(reconstructor: Reconstructor) -> Self {
        Self {
            reconstructor,
            cursor: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DebuggerState {
        self.cursor
            .as_ref()
            .map(|c| c.state)
            .unwrap_or(DebuggerState::Closed)
    }

    /// Load a record and place the cursor on the initial state.
    ///
    /// Any previously open record is discarded first. Refused records
    /// leave the debugger closed.
    pub fn open(&mut self, record: impl Into<Arc<ReplayRecord>>) -> Result<DebuggerView, DebuggerError> {
        self.close();
        let stepper = self.reconstructor.stepper(record)?;
        info!(
            game_id = %stepper.record().game_id,
            actions = stepper.len(),
            "replay opened"
        );
        let cursor = Cursor {
            cache: vec![stepper.current().clone()],
            stepper,
            position: 0,
            state: DebuggerState::Ready,
        };
        let view = cursor.view();
        self.cursor = Some(cursor);
        Ok(view)
    }

    /// Advance one turn.
    pub fn step_forward(&mut self) -> Result<DebuggerView, DebuggerError> {
        let cursor = self.cursor.as_mut().ok_or(DebuggerError::NotOpen)?;
        if cursor.position + 1 >= cursor.cache.len() && !cursor.extend()? {
            return Err(DebuggerError::AtEnd(cursor.position));
        }
        cursor.position += 1;
        cursor.state = DebuggerState::Stepping;
        debug!(turn = cursor.position, "step forward");
        Ok(cursor.view())
    }

    /// Go back one turn, served from the cache.
    pub fn step_backward(&mut self) -> Result<DebuggerView, DebuggerError> {
        let cursor = self.cursor.as_mut().ok_or(DebuggerError::NotOpen)?;
        if cursor.position == 0 {
            return Err(DebuggerError::AtStart);
        }
        cursor.position -= 1;
        cursor.state = DebuggerState::Stepping;
        debug!(turn = cursor.position, "step backward");
        Ok(cursor.view())
    }

    /// Seek to a turn, materializing forward as needed.
    ///
    /// If reconstruction halts first, the states reached so far stay cached
    /// and the cursor does not move.
    pub fn jump_to(&mut self, turn: usize) -> Result<DebuggerView, DebuggerError> {
        let cursor = self.cursor.as_mut().ok_or(DebuggerError::NotOpen)?;
        while cursor.cache.len() <= turn {
            if !cursor.extend()? {
                return Err(DebuggerError::TurnOutOfRange {
                    requested: turn,
                    last: cursor.cache.len() - 1,
                });
            }
        }
        cursor.position = turn;
        cursor.state = DebuggerState::Stepping;
        debug!(turn, "jump");
        Ok(cursor.view())
    }

    /// View at the cursor.
    pub fn view(&self) -> Result<DebuggerView, DebuggerError> {
        self.cursor
            .as_ref()
            .map(Cursor::view)
            .ok_or(DebuggerError::NotOpen)
    }

    /// Checksum mismatches found so far.
    pub fn violations(&self) -> &[DeterminismViolation] {
        self.cursor
            .as_ref()
            .map(|c| c.stepper.violations())
            .unwrap_or(&[])
    }

    /// Fatal error that stopped materialization, if any.
    pub fn halted(&self) -> Option<&ReplayError> {
        self.cursor.as_ref().and_then(|c| c.stepper.halted())
    }

    /// Number of states materialized so far.
    pub fn cached(&self) -> usize {
        self.cursor.as_ref().map(|c| c.cache.len()).unwrap_or(0)
    }

    /// Draws taken by the replay generator so far.
    pub fn replay_draws(&self) -> u64 {
        self.cursor.as_ref().map(|c| c.stepper.rng().draws()).unwrap_or(0)
    }

    /// Drop the record and every cached state.
    pub fn close(&mut self) {
        if self.cursor.take().is_some() {
            info!("replay closed");
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
