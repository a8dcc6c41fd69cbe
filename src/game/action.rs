//! Actions and Commands
//!
//! An [`Action`] is a discrete, serializable intent ("move right", "attack
//! monster-1"). A [`Command`] binds an action to the rule set so it can be
//! applied to a state with an explicit random source.
//!
//! The set of action kinds is closed. Adding a kind means adding an
//! [`ActionKind`] variant, and every `match` over it (recording policy,
//! payload parsing, application) then refuses to compile until the new kind
//! is handled.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::core::rng::DeterministicRng;
use crate::game::rules::{self, Rules};
use crate::game::state::{Direction, GameState, MonsterId};

// =============================================================================
// KINDS
// =============================================================================

/// Who initiated an action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorKind {
    /// Keyboard input from the player.
    Player,
    /// Scheduled by the game itself.
    System,
}

/// Whether an action kind must appear in the replay log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recording {
    /// Recorded before it is applied.
    Required,
    /// Debug-only; never affects game state and never logged.
    Exempt,
}

/// Closed set of action kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    /// Step or bump in a direction
    Move,
    /// Melee a named monster
    Attack,
    /// Pick up gold underfoot
    PickUp,
    /// Take the stairs down
    Descend,
    /// Wait a turn
    Rest,
    /// Persist the game
    Save,
    /// System: bring a wandering monster onto the level
    SpawnWanderer,
    /// Debug: switch map rendering
    ToggleRenderMode,
    /// Debug: show the whole level
    RevealMap,
}

/// Action kind string that names no known kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown action kind {0:?}")]
pub struct UnknownKind(pub String);

impl ActionKind {
    /// Every kind, in declaration order.
    pub const ALL: [ActionKind; 9] = [
        ActionKind::Move,
        ActionKind::Attack,
        ActionKind::PickUp,
        ActionKind::Descend,
        ActionKind::Rest,
        ActionKind::Save,
        ActionKind::SpawnWanderer,
        ActionKind::ToggleRenderMode,
        ActionKind::RevealMap,
    ];

    /// Wire name, as stored in `actionKind`.
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Move => "MOVE",
            ActionKind::Attack => "ATTACK",
            ActionKind::PickUp => "PICK_UP",
            ActionKind::Descend => "DESCEND",
            ActionKind::Rest => "REST",
            ActionKind::Save => "SAVE",
            ActionKind::SpawnWanderer => "SPAWN_WANDERER",
            ActionKind::ToggleRenderMode => "TOGGLE_RENDER_MODE",
            ActionKind::RevealMap => "REVEAL_MAP",
        }
    }

    /// Recording policy. This match is the debug-action allow-list.
    pub fn recording(self) -> Recording {
        match self {
            ActionKind::Move
            | ActionKind::Attack
            | ActionKind::PickUp
            | ActionKind::Descend
            | ActionKind::Rest
            | ActionKind::Save
            | ActionKind::SpawnWanderer => Recording::Required,
            ActionKind::ToggleRenderMode | ActionKind::RevealMap => Recording::Exempt,
        }
    }

    /// Who issues this kind.
    pub fn actor(self) -> ActorKind {
        match self {
            ActionKind::SpawnWanderer => ActorKind::System,
            ActionKind::Move
            | ActionKind::Attack
            | ActionKind::PickUp
            | ActionKind::Descend
            | ActionKind::Rest
            | ActionKind::Save
            | ActionKind::ToggleRenderMode
            | ActionKind::RevealMap => ActorKind::Player,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

// =============================================================================
// ACTIONS
// =============================================================================

/// A concrete action with its payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Step or bump.
    Move {
        /// Where to go
        direction: Direction,
    },
    /// Melee a monster.
    Attack {
        /// Who to hit
        target: MonsterId,
    },
    /// Pick up gold.
    PickUp,
    /// Take the stairs.
    Descend,
    /// Wait.
    Rest,
    /// Persist the game.
    Save,
    /// Spawn a wandering monster.
    SpawnWanderer,
    /// Switch map rendering.
    ToggleRenderMode,
    /// Reveal the level.
    RevealMap,
}

impl Action {
    /// Kind tag.
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Move { .. } => ActionKind::Move,
            Action::Attack { .. } => ActionKind::Attack,
            Action::PickUp => ActionKind::PickUp,
            Action::Descend => ActionKind::Descend,
            Action::Rest => ActionKind::Rest,
            Action::Save => ActionKind::Save,
            Action::SpawnWanderer => ActionKind::SpawnWanderer,
            Action::ToggleRenderMode => ActionKind::ToggleRenderMode,
            Action::RevealMap => ActionKind::RevealMap,
        }
    }

    /// Payload as stored in the log. Payload-less kinds store `{}`.
    pub fn payload(&self) -> Value {
        match self {
            Action::Move { direction } => json!({ "direction": direction }),
            Action::Attack { target } => json!({ "target": target }),
            Action::PickUp
            | Action::Descend
            | Action::Rest
            | Action::Save
            | Action::SpawnWanderer
            | Action::ToggleRenderMode
            | Action::RevealMap => json!({}),
        }
    }

    /// Shorthand for a move.
    pub fn step(direction: Direction) -> Self {
        Action::Move { direction }
    }

    /// Shorthand for an attack.
    pub fn attack(target: MonsterId) -> Self {
        Action::Attack { target }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Move { direction } => write!(f, "MOVE({:?})", direction),
            Action::Attack { target } => write!(f, "ATTACK({})", target),
            other => f.write_str(other.kind().as_str()),
        }
    }
}

// =============================================================================
// APPLICATION
// =============================================================================

/// Side effect that completes outside the game loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PendingIo {
    /// Write the current replay record to the store.
    Save,
}

/// Result of applying a command.
///
/// Both shapes carry the complete next state. A pending side effect never
/// feeds back into it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Applied {
    /// Purely synchronous.
    Ready(GameState),
    /// State is final; `io` still has to run.
    Pending {
        /// Next state
        state: GameState,
        /// Detached work
        io: PendingIo,
    },
}

impl Applied {
    /// Next state.
    pub fn state(&self) -> &GameState {
        match self {
            Applied::Ready(state) | Applied::Pending { state, .. } => state,
        }
    }

    /// Take the next state, dropping any pending work.
    pub fn into_state(self) -> GameState {
        match self {
            Applied::Ready(state) | Applied::Pending { state, .. } => state,
        }
    }
}

/// An action bound to the rule set, ready to run.
#[derive(Clone, Debug)]
pub struct Command {
    action: Action,
    rules: Arc<Rules>,
}

impl Command {
    /// Bind an action.
    pub fn new(action: Action, rules: Arc<Rules>) -> Self {
        Self { action, rules }
    }

    /// The bound action.
    pub fn action(&self) -> &Action {
        &self.action
    }

    /// Compute the next state. `state` is never modified.
    pub fn apply(&self, state: &GameState, rng: &mut DeterministicRng) -> Applied {
        let rules = self.rules.as_ref();
        match &self.action {
            Action::Move { direction } => Applied::Ready(rules::move_player(state, *direction, rng, rules)),
            Action::Attack { target } => Applied::Ready(rules::attack(state, *target, rng, rules)),
            Action::PickUp => Applied::Ready(rules::pick_up(state, rng, rules)),
            Action::Descend => Applied::Ready(rules::descend(state, rng, rules)),
            Action::Rest => Applied::Ready(rules::rest(state, rng, rules)),
            Action::Save => Applied::Pending {
                state: state.clone(),
                io: PendingIo::Save,
            },
            Action::SpawnWanderer => Applied::Ready(rules::spawn_wanderer(state, rng)),
            // View toggles live outside the game state
            Action::ToggleRenderMode | Action::RevealMap => Applied::Ready(state.clone()),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
