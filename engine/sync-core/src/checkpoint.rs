//! Checkpoint persistence for resumable sessions
//!
//! Every session shares one JSON document keyed by session name. Saving a
//! session rewrites the whole document through a temporary file and a rename,
//! so an interrupted write never damages the entries of other sessions.
//! Reading is lenient: a missing, unreadable or malformed document is treated
//! as "no prior progress".

use crate::error::{Result, SyncError};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default file name of the checkpoint document
pub const DEFAULT_STATE_FILE: &str = "state.json";

/// Progress of one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint<W, S> {
    /// Offset of the next unprocessed item in `items`
    #[serde(rename = "last_index")]
    pub next_index: usize,

    /// Work list captured when the session started
    pub items: Vec<W>,

    /// Data accumulated by the session so far
    pub state: S,

    /// When the checkpoint was last written
    pub updated_at: DateTime<Utc>,
}

impl<W, S> Checkpoint<W, S> {
    /// Start a new session at the first item
    pub fn fresh(items: Vec<W>, state: S) -> Self {
        Self { next_index: 0, items, state, updated_at: Utc::now() }
    }

    /// Whether `next_index` still points into (or just past) the work list
    pub fn is_valid(&self) -> bool {
        self.next_index <= self.items.len()
    }

    /// Number of items not yet processed
    pub fn remaining(&self) -> usize {
        self.items.len().saturating_sub(self.next_index)
    }

    /// Whether every item has been processed
    pub fn is_finished(&self) -> bool {
        self.next_index >= self.items.len()
    }

    /// Refresh the modification stamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Keyed storage of raw checkpoint entries
pub trait CheckpointStore: Send + Sync {
    /// Read the entry for a session; `None` if absent or unreadable
    fn load_entry(&self, session_key: &str) -> Option<Value>;

    /// Overwrite the entry for a session
    fn save_entry(&self, session_key: &str, entry: Value) -> Result<()>;

    /// Remove the entry for a session (no-op when absent)
    fn clear(&self, session_key: &str) -> Result<()>;
}

/// Typed access to a [`CheckpointStore`]
pub trait CheckpointStoreExt: CheckpointStore {
    /// Load and decode a checkpoint. Entries that do not decode are discarded.
    fn load<W, S>(&self, session_key: &str) -> Option<Checkpoint<W, S>>
    where
        W: DeserializeOwned,
        S: DeserializeOwned,
    {
        let entry = self.load_entry(session_key)?;
        match serde_json::from_value(entry) {
            Ok(checkpoint) => Some(checkpoint),
            Err(e) => {
                tracing::warn!(
                    "Ignoring undecodable checkpoint for session {}: {}",
                    session_key,
                    e
                );
                None
            }
        }
    }

    /// Encode and save a checkpoint
    fn save<W, S>(&self, session_key: &str, checkpoint: &Checkpoint<W, S>) -> Result<()>
    where
        W: Serialize,
        S: Serialize,
    {
        let entry = serde_json::to_value(checkpoint)?;
        self.save_entry(session_key, entry)
    }
}

impl<T: CheckpointStore + ?Sized> CheckpointStoreExt for T {}

/// Checkpoint store backed by a single JSON file
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    /// Create a store for the given file path. The file is created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the checkpoint document
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Session keys currently stored
    pub fn session_keys(&self) -> Vec<String> {
        self.read_document().keys().cloned().collect()
    }

    fn read_document(&self) -> Map<String, Value> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No checkpoint file at {:?}, starting with clean state", self.path);
                return Map::new();
            }
            Err(e) => {
                tracing::warn!("Unreadable checkpoint file {:?}: {}", self.path, e);
                return Map::new();
            }
        };

        match serde_json::from_str::<Value>(&contents) {
            Ok(Value::Object(document)) => document,
            Ok(other) => {
                tracing::warn!(
                    "Checkpoint file {:?} is not a keyed document (found {}), ignoring it",
                    self.path,
                    json_kind(&other)
                );
                Map::new()
            }
            Err(e) => {
                tracing::warn!("Corrupt checkpoint file {:?}: {}", self.path, e);
                Map::new()
            }
        }
    }

    fn write_document(&self, document: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let temp_path = self.temp_path();
        let file = OpenOptions::new().create(true).write(true).truncate(true).open(&temp_path)?;

        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, document)?;
        writer.flush()?;

        let file: File = writer.into_inner().map_err(|e| SyncError::Io(e.into_error()))?;
        file.sync_all()?;

        std::fs::rename(&temp_path, &self.path)?;

        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| DEFAULT_STATE_FILE.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl Default for FileCheckpointStore {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_FILE)
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load_entry(&self, session_key: &str) -> Option<Value> {
        self.read_document().remove(session_key)
    }

    fn save_entry(&self, session_key: &str, entry: Value) -> Result<()> {
        let mut document = self.read_document();
        document.insert(session_key.to_string(), entry);
        self.write_document(&document)?;

        tracing::debug!("Saved checkpoint for session {} to {:?}", session_key, self.path);
        Ok(())
    }

    fn clear(&self, session_key: &str) -> Result<()> {
        let mut document = self.read_document();
        if document.remove(session_key).is_none() {
            return Ok(());
        }

        self.write_document(&document)?;

        tracing::debug!("Cleared checkpoint for session {}", session_key);
        Ok(())
    }
}

/// In-memory checkpoint store (for testing)
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointStore {
    entries: Arc<Mutex<HashMap<String, Value>>>,
}

impl InMemoryCheckpointStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an entry exists for the session
    pub fn contains(&self, session_key: &str) -> bool {
        self.entries.lock().contains_key(session_key)
    }

    /// Number of sessions with a stored entry
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the store holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn load_entry(&self, session_key: &str) -> Option<Value> {
        self.entries.lock().get(session_key).cloned()
    }

    fn save_entry(&self, session_key: &str, entry: Value) -> Result<()> {
        self.entries.lock().insert(session_key.to_string(), entry);
        Ok(())
    }

    fn clear(&self, session_key: &str) -> Result<()> {
        self.entries.lock().remove(session_key);
        Ok(())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
