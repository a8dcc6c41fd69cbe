//! Engine configuration.
//!
//! Loaded from a JSON file; every field has a default, so a partial file
//! (or none at all) is valid.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::rules::Rules;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("cannot read config {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// File is not valid configuration JSON.
    #[error("cannot parse config {path}: {source}")]
    Parse {
        /// File path
        path: PathBuf,
        /// Underlying error
        source: serde_json::Error,
    },

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Settings for recording, replay and the rule set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum logged actions per player turn (`k`)
    pub actions_per_turn: usize,
    /// Store a state hash every N actions (0 disables checkpoints)
    pub checkpoint_interval: usize,
    /// Stop eager reconstruction after this many actions
    pub turn_horizon: Option<usize>,
    /// Save automatically every N player turns (0 disables)
    pub autosave_interval: u64,
    /// Directory for saved records
    pub save_dir: PathBuf,
    /// Rule constants
    pub rules: Rules,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            actions_per_turn: 1,
            checkpoint_interval: 1,
            turn_horizon: None,
            autosave_interval: 0,
            save_dir: PathBuf::from("saves"),
            rules: Rules::default(),
        }
    }
}

impl EngineConfig {
    /// Load and validate a config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.actions_per_turn == 0 {
            return Err(ConfigError::Invalid("actions_per_turn must be at least 1".into()));
        }
        let (lo, hi) = self.rules.player_damage;
        if lo > hi || lo < 0 {
            return Err(ConfigError::Invalid(format!("player_damage range {}..={} is empty", lo, hi)));
        }
        if self.rules.level_width < 5 || self.rules.level_height < 5 {
            return Err(ConfigError::Invalid("levels must be at least 5x5".into()));
        }
        if self.rules.win_depth == 0 {
            return Err(ConfigError::Invalid("win_depth must be at least 1".into()));
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
