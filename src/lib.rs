//! # Delve Replay Engine
//!
//! Deterministic command log and replay for a turn-based dungeon crawler.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     DELVE ENGINE                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── rng.rs      - Xorshift128+ with snapshot/restore        │
//! │  └── hash.rs     - State hashing for checkpoints             │
//! │                                                              │
//! │  game/           - Game logic (deterministic)                │
//! │  ├── state.rs    - Player, monsters, game state              │
//! │  ├── level.rs    - Level layout and generation               │
//! │  ├── rules.rs    - Reference rule set                        │
//! │  └── action.rs   - Actions and their application            │
//! │                                                              │
//! │  replay/         - Command log and replay                    │
//! │  ├── recorder.rs - Append-only action log                    │
//! │  ├── record.rs   - Persisted replay format                   │
//! │  ├── factory.rs  - Kind + payload to command                 │
//! │  ├── reconstruct.rs - State rebuilding                       │
//! │  └── debugger.rs - Step-through inspection                   │
//! │                                                              │
//! │  session/        - Live play (non-deterministic edges)       │
//! │  ├── live.rs     - Dispatch, checkpoints, detached saves     │
//! │  └── store.rs    - Record persistence                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/` and `game/` modules are deterministic:
//! - No HashMap (BTreeMap for sorted iteration)
//! - No system time in game logic
//! - All randomness from the session generator, whose state is logged
//!   before every action
//!
//! Given the initial state and the log, replay produces the same state
//! sequence on any platform. Checkpoint hashes detect when it does not.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod game;
pub mod replay;
pub mod session;

// Re-export commonly used types
pub use crate::config::{ConfigError, EngineConfig};
pub use crate::core::rng::{DeterministicRng, RngSnapshot, Seed};
pub use crate::game::action::{Action, ActionKind};
pub use crate::game::state::GameState;
pub use crate::replay::{Reconstruction, Reconstructor, ReplayDebugger, ReplayError, ReplayRecord};
pub use crate::session::{LiveSession, SaveNotice};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
