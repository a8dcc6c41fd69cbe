//! State Hashing for Verification
//!
//! Provides deterministic hashing of game state for:
//! - Checkpoints recorded alongside the live action log
//! - Divergence detection during replay

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Hash output type (256 bits / 32 bytes)
pub type StateHash = [u8; 32];

/// Domain separator for game state checkpoints.
pub const STATE_DOMAIN: &[u8] = b"DELVE_STATE_V1";

/// Deterministic hasher for game state.
///
/// Wraps SHA-256 with a domain separator.
/// Order of updates is critical for determinism.
pub struct StateHasher {
    hasher: Sha256,
}

impl StateHasher {
    /// Create a new hasher with domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Create hasher for game state checkpoints.
    pub fn for_game_state() -> Self {
        Self::new(STATE_DOMAIN)
    }

    /// Update with a u64 value (little-endian).
    #[inline]
    pub fn update_u64(&mut self, value: u64) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with the canonical binary encoding of a serializable value.
    ///
    /// The encoding is bincode, which is stable for a given type layout as
    /// long as maps are ordered.
    pub fn update_serialized<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), DigestError> {
        let bytes = bincode::serialize(value).map_err(|e| DigestError(e.to_string()))?;
        self.update_u64(bytes.len() as u64);
        self.hasher.update(&bytes);
        Ok(())
    }

    /// Finalize and return the hash.
    pub fn finalize(self) -> StateDigest {
        StateDigest(self.hasher.finalize().into())
    }
}

/// Failure to encode a value for hashing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot encode value for hashing: {0}")]
pub struct DigestError(pub String);

/// A finalized state hash, rendered as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateDigest(pub StateHash);

impl StateDigest {
    /// Raw bytes.
    pub fn as_bytes(&self) -> &StateHash {
        &self.0
    }

    /// First four bytes in hex, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for StateDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for StateDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateDigest({})", self.short())
    }
}

impl FromStr for StateDigest {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = [0u8; 32];
        hex::decode_to_slice(s, &mut out)?;
        Ok(Self(out))
    }
}

impl Serialize for StateDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StateDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Hash any serializable state under the game state domain.
///
/// The replay core never looks inside the state; it only needs this digest.
pub fn state_digest<T: Serialize + ?Sized>(state: &T) -> Result<StateDigest, DigestError> {
    let mut hasher = StateHasher::for_game_state();
    hasher.update_serialized(state)?;
    Ok(hasher.finalize())
}

// =============================================================================
// TESTS
// =============================================================================
