//! Deterministic Random Number Generator
//!
//! Uses Xorshift128+ algorithm for fast, high-quality, deterministic randomness.
//! Given the same seed, produces identical sequence on all platforms.
//!
//! One generator is owned per session and passed explicitly to every rule
//! that needs randomness. Its complete internal state can be captured as an
//! [`RngSnapshot`] and restored later, which is what makes replay possible.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Current snapshot encoding version.
pub const SNAPSHOT_VERSION: u8 = 1;

/// Prefix naming the generator algorithm inside an encoded snapshot.
const SNAPSHOT_TAG: &str = "xs128p";

// =============================================================================
// SEED
// =============================================================================

/// Session seed, either numeric or free text.
///
/// Text seeds are reduced to a `u64` through SHA-256, so `"test-seed"` always
/// produces the same generator. Text that is a plain decimal `u64` is taken
/// as a numeric seed, so a seed reads back the same from its text form.
///
/// Always serialized as a string; numeric JSON values are still accepted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Seed {
    /// Numeric seed, used as is.
    Number(u64),
    /// Text seed, hashed down to 64 bits.
    Text(String),
}

impl Seed {
    /// Reduce the seed to the 64-bit value fed to SplitMix64.
    pub fn to_u64(&self) -> u64 {
        match self {
            Seed::Number(n) => *n,
            Seed::Text(text) => derive_text_seed(text),
        }
    }

    /// Stored text form.
    pub fn as_text(&self) -> String {
        match self {
            Seed::Number(n) => n.to_string(),
            Seed::Text(text) => text.clone(),
        }
    }
}

impl From<u64> for Seed {
    fn from(value: u64) -> Self {
        Seed::Number(value)
    }
}

impl From<&str> for Seed {
    fn from(value: &str) -> Self {
        match value.parse::<u64>() {
            Ok(n) => Seed::Number(n),
            Err(_) => Seed::Text(value.to_string()),
        }
    }
}

impl FromStr for Seed {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Seed::from(s))
    }
}

impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Seed::Number(n) => write!(f, "{}", n),
            Seed::Text(text) => write!(f, "{:?}", text),
        }
    }
}

impl Serialize for Seed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_text())
    }
}

impl<'de> Deserialize<'de> for Seed {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Stored {
            Number(u64),
            Text(String),
        }

        Ok(match Stored::deserialize(deserializer)? {
            Stored::Number(n) => Seed::Number(n),
            Stored::Text(text) => Seed::from(text.as_str()),
        })
    }
}

/// Derive a generator seed from text.
pub fn derive_text_seed(text: &str) -> u64 {
    let mut hasher = Sha256::new();

    // Domain separator
    hasher.update(b"DELVE_SEED_V1");
    hasher.update(text.as_bytes());

    let hash = hasher.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&hash[0..8]);
    u64::from_le_bytes(head)
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Errors raised when a snapshot cannot be decoded or restored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    /// Encoded form does not follow `xs128p/<version>:<32 hex digits>`.
    #[error("malformed snapshot encoding: {0}")]
    Malformed(String),

    /// Snapshot was produced by a generator version this build cannot restore.
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u8),

    /// All-zero state, which Xorshift128+ can never reach.
    #[error("snapshot holds the all-zero state")]
    ZeroState,
}

/// Complete internal state of a [`DeterministicRng`] at one instant.
///
/// Restoring a snapshot and drawing yields exactly the values the original
/// generator yielded after the snapshot was taken.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RngSnapshot {
    version: u8,
    state: [u64; 2],
}

impl RngSnapshot {
    /// Build a snapshot from raw parts.
    pub const fn from_parts(version: u8, state: [u64; 2]) -> Self {
        Self { version, state }
    }

    /// Encoding version.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Raw generator words.
    pub fn state(&self) -> [u64; 2] {
        self.state
    }

    /// Check that this snapshot can seed a generator.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(self.version));
        }
        if self.state == [0, 0] {
            return Err(SnapshotError::ZeroState);
        }
        Ok(())
    }
}

impl fmt::Display for RngSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&self.state[0].to_be_bytes());
        bytes[8..].copy_from_slice(&self.state[1].to_be_bytes());
        write!(f, "{}/{}:{}", SNAPSHOT_TAG, self.version, hex::encode(bytes))
    }
}

impl FromStr for RngSnapshot {
    type Err = SnapshotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || SnapshotError::Malformed(s.to_string());

        let rest = s
            .strip_prefix(SNAPSHOT_TAG)
            .and_then(|r| r.strip_prefix('/'))
            .ok_or_else(malformed)?;
        let (version, words) = rest.split_once(':').ok_or_else(malformed)?;
        let version: u8 = version.parse().map_err(|_| malformed())?;

        let bytes = hex::decode(words).map_err(|_| malformed())?;
        if bytes.len() != 16 {
            return Err(malformed());
        }
        let mut hi = [0u8; 8];
        let mut lo = [0u8; 8];
        hi.copy_from_slice(&bytes[..8]);
        lo.copy_from_slice(&bytes[8..]);

        Ok(Self {
            version,
            state: [u64::from_be_bytes(hi), u64::from_be_bytes(lo)],
        })
    }
}

// =============================================================================
// GENERATOR
// =============================================================================

/// Deterministic PRNG using Xorshift128+ algorithm.
///
/// # Determinism Guarantee
///
/// Given the same seed, this RNG will produce the exact same sequence
/// of random numbers on any platform.
///
/// # Example
///
/// ```
/// use delve::core::rng::DeterministicRng;
///
/// let mut a = DeterministicRng::new(12345);
/// let snap = a.snapshot();
/// let first = a.next_u64();
///
/// let mut b = DeterministicRng::new(0);
/// b.restore(&snap).unwrap();
/// assert_eq!(b.next_u64(), first);
/// ```
#[derive(Clone, Debug)]
pub struct DeterministicRng {
    state: [u64; 2],
    draws: u64,
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DeterministicRng {
    /// Create a new RNG from a 64-bit seed.
    ///
    /// Uses SplitMix64 to initialize the internal state, ensuring
    /// good distribution even from weak seeds.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let state0 = splitmix64(&mut s);
        let state1 = splitmix64(&mut s);

        // Ensure state is never all zeros
        let state = if state0 == 0 && state1 == 0 {
            [1, 1]
        } else {
            [state0, state1]
        };

        Self { state, draws: 0 }
    }

    /// Create RNG from a session seed.
    pub fn from_seed(seed: &Seed) -> Self {
        Self::new(seed.to_u64())
    }

    /// Generate the next 64-bit random value.
    ///
    /// Every other draw helper funnels through here.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);
        self.draws += 1;

        result
    }

    /// Uniform value in `[0, 1)` built from the top 53 bits of one draw.
    #[inline]
    pub fn draw(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Generate a random integer in range [0, max).
    #[inline]
    pub fn next_below(&mut self, max: u32) -> u32 {
        if max == 0 {
            return 0;
        }
        (self.next_u64() % max as u64) as u32
    }

    /// Generate a random integer in range [min, max].
    #[inline]
    pub fn next_int_range(&mut self, min: i32, max: i32) -> i32 {
        if min >= max {
            return min;
        }
        let range = (max as i64 - min as i64 + 1) as u32;
        min + self.next_below(range) as i32
    }

    /// True with probability `p`, derived from [`Self::draw`].
    #[inline]
    pub fn next_bool(&mut self, p: f64) -> bool {
        self.draw() < p
    }

    /// True with probability `numerator / denominator`.
    ///
    /// Integer form used by the rule set, which keeps floats out of game logic.
    #[inline]
    pub fn chance(&mut self, numerator: u32, denominator: u32) -> bool {
        self.next_below(denominator) < numerator
    }

    /// Select a random element from a slice.
    pub fn choose<'a, T>(&mut self, slice: &'a [T]) -> Option<&'a T> {
        if slice.is_empty() {
            None
        } else {
            let idx = self.next_below(slice.len() as u32) as usize;
            slice.get(idx)
        }
    }

    /// Capture the full generator state. Does not advance the stream.
    pub fn snapshot(&self) -> RngSnapshot {
        RngSnapshot::from_parts(SNAPSHOT_VERSION, self.state)
    }

    /// Reset the generator to a previously captured snapshot.
    ///
    /// On error the generator is left untouched.
    pub fn restore(&mut self, snapshot: &RngSnapshot) -> Result<(), SnapshotError> {
        snapshot.validate()?;
        self.state = snapshot.state;
        Ok(())
    }

    /// Number of draws taken through this instance (diagnostic only).
    pub fn draws(&self) -> u64 {
        self.draws
    }
}

/// SplitMix64 for seed initialization.
/// Produces well-distributed values from sequential seeds.
#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

// =============================================================================
// TESTS
// =============================================================================
