//! Core deterministic primitives.
//!
//! Everything in this module is a pure function of its inputs: no wall clock,
//! no global entropy, no unordered iteration.

pub mod hash;
pub mod rng;

// Re-export core types
pub use hash::{state_digest, StateDigest};
pub use rng::{DeterministicRng, RngSnapshot, Seed, SnapshotError};
