//! Replay Persistence
//!
//! Async storage for finished or in-progress replay records. The live
//! session only ever talks to a store from a detached task.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::replay::record::ReplayRecord;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record with this id.
    #[error("no saved game {0}")]
    NotFound(Uuid),

    /// Filesystem failure.
    #[error("storage I/O: {0}")]
    Io(#[from] std::io::Error),

    /// Stored bytes are not a replay record.
    #[error("stored record is unreadable: {0}")]
    Codec(String),
}

/// Somewhere replay records can be kept.
#[async_trait]
pub trait ReplayStore: Send + Sync {
    /// Write or overwrite the record for its game id.
    async fn save(&self, record: &ReplayRecord) -> Result<(), StoreError>;

    /// Read a record back.
    async fn load(&self, game_id: Uuid) -> Result<ReplayRecord, StoreError>;

    /// Ids of every stored record, sorted.
    async fn list(&self) -> Result<Vec<Uuid>, StoreError>;
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// In-process store, mostly for tests and tooling.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<Uuid, ReplayRecord>>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReplayStore for MemoryStore {
    async fn save(&self, record: &ReplayRecord) -> Result<(), StoreError> {
        self.records.write().await.insert(record.game_id, record.clone());
        Ok(())
    }

    async fn load(&self, game_id: Uuid) -> Result<ReplayRecord, StoreError> {
        self.records
            .read()
            .await
            .get(&game_id)
            .cloned()
            .ok_or(StoreError::NotFound(game_id))
    }

    async fn list(&self) -> Result<Vec<Uuid>, StoreError> {
        Ok(self.records.read().await.keys().copied().collect())
    }
}

// =============================================================================
// FILE STORE
// =============================================================================

/// One pretty-printed JSON file per game, named `<game id>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Store rooted at a directory. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File a game is stored in.
    pub fn path_for(&self, game_id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", game_id))
    }

    /// Read a record from an arbitrary file.
    pub async fn read_file(path: impl AsRef<Path>) -> Result<ReplayRecord, StoreError> {
        let bytes = tokio::fs::read(path).await?;
        ReplayRecord::from_bytes(&bytes).map_err(|e| StoreError::Codec(e.to_string()))
    }
}

#[async_trait]
impl ReplayStore for FileStore {
    async fn save(&self, record: &ReplayRecord) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let text = record.to_json().map_err(|e| StoreError::Codec(e.to_string()))?;

        // A save file is either the old record or the new one, never partial
        let path = self.path_for(record.game_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, text).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(path = %path.display(), "record written");
        Ok(())
    }

    async fn load(&self, game_id: Uuid) -> Result<ReplayRecord, StoreError> {
        let path = self.path_for(game_id);
        match Self::read_file(&path).await {
            Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(game_id))
            }
            other => other,
        }
    }

    async fn list(&self) -> Result<Vec<Uuid>, StoreError> {
        let mut ids = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| Uuid::parse_str(s).ok())
            {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

// =============================================================================
// TESTS
// =============================================================================
