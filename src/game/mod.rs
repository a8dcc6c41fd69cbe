//! Game logic (deterministic).
//!
//! A compact reference rule set that drives the replay engine: movement,
//! melee, hunger, stairs and wandering monsters. Every rule is a pure
//! function of the previous state, the action and the session generator.

pub mod action;
pub mod level;
pub mod rules;
pub mod state;

pub use action::{Action, ActionKind, ActorKind, Applied, Command, PendingIo, Recording};
pub use level::Level;
pub use rules::Rules;
pub use state::{Direction, GameState, MonsterId, Outcome, Player, Position};
