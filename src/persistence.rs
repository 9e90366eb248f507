//! Snapshot persistence for the vote ledger

use crate::blockchain::{Entry, Payload};
use crate::config::{StorageBackend, StorageConfig};
use crate::error::ChainError;
use rusqlite::{params, Connection};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Abstraction for persistence backends. A save replaces the previous
/// snapshot as a whole; a reader never sees a partially written one.
pub trait Persistence: Send + Sync {
    fn save_chain(&self, entries: &[Entry]) -> Result<(), ChainError>;
    /// Returns the stored entries verbatim. Missing snapshots are reported
    /// as [`ChainError::SnapshotNotFound`].
    fn load_chain(&self) -> Result<Vec<Entry>, ChainError>;
    fn describe(&self) -> String;
}

/// Pick the backend named in the configuration.
pub fn open_persistence(storage: &StorageConfig) -> Result<Box<dyn Persistence>, ChainError> {
    match storage.backend {
        StorageBackend::Json => Ok(Box::new(JsonFilePersistence::new(&storage.path))),
        StorageBackend::Sqlite => {
            ensure_parent_dir(Path::new(&storage.path))?;
            Ok(Box::new(Database::open(&storage.path)?))
        }
    }
}

fn ensure_parent_dir(path: &Path) -> Result<(), ChainError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| {
                ChainError::IoError(format!("Failed to create data dir {:?}: {}", parent, e))
            })?;
        }
    }
    Ok(())
}

/// Pretty-printed JSON array of entries, written atomically.
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl Persistence for JsonFilePersistence {
    fn save_chain(&self, entries: &[Entry]) -> Result<(), ChainError> {
        ensure_parent_dir(&self.path)?;

        let json = serde_json::to_string_pretty(entries)?;

        // Atomic write using temporary file
        let temp_path = self.temp_path();
        let mut file = File::create(&temp_path)
            .map_err(|e| ChainError::IoError(format!("Failed to create temp file: {}", e)))?;

        file.write_all(json.as_bytes())
            .map_err(|e| ChainError::IoError(format!("Failed to write snapshot: {}", e)))?;

        file.sync_all()
            .map_err(|e| ChainError::IoError(format!("Failed to sync file: {}", e)))?;

        drop(file);

        fs::rename(&temp_path, &self.path)
            .map_err(|e| ChainError::IoError(format!("Failed to finalize write: {}", e)))?;

        Ok(())
    }

    fn load_chain(&self) -> Result<Vec<Entry>, ChainError> {
        if !self.path.exists() {
            return Err(ChainError::SnapshotNotFound(self.path.display().to_string()));
        }

        let contents = fs::read_to_string(&self.path)
            .map_err(|e| ChainError::IoError(format!("Failed to read snapshot: {}", e)))?;

        serde_json::from_str(&contents)
            .map_err(|e| ChainError::CorruptSnapshot(format!("Failed to parse snapshot: {}", e)))
    }

    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }
}

/// SQLite-backed snapshot store; one row per entry.
pub struct Database {
    conn: Mutex<Connection>,
    path: String,
}

impl Database {
    pub fn open(path: &str) -> Result<Self, ChainError> {
        let conn = Connection::open(path)
            .map_err(|e| ChainError::DatabaseError(format!("Failed to open database: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS entries (
                position INTEGER PRIMARY KEY,
                timestamp INTEGER NOT NULL,
                payload TEXT NOT NULL,
                previous_digest TEXT NOT NULL,
                digest TEXT NOT NULL,
                nonce INTEGER NOT NULL
            )",
            [],
        )
        .map_err(|e| ChainError::DatabaseError(format!("Failed to create entries table: {}", e)))?;

        Ok(Database {
            conn: Mutex::new(conn),
            path: path.to_string(),
        })
    }

    pub fn entry_count(&self) -> Result<u64, ChainError> {
        let conn = self.conn.lock().map_err(|_| ChainError::DatabaseError("Mutex poisoned".to_string()))?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))
            .map_err(|e| ChainError::DatabaseError(format!("Failed to count entries: {}", e)))?;
        Ok(count as u64)
    }
}

impl Persistence for Database {
    fn save_chain(&self, entries: &[Entry]) -> Result<(), ChainError> {
        let conn_guard = self.conn.lock().map_err(|_| ChainError::DatabaseError("Mutex poisoned".to_string()))?;
        let tx = conn_guard.unchecked_transaction().map_err(|e| {
            ChainError::DatabaseError(format!("Failed to start transaction: {}", e))
        })?;

        tx.execute("DELETE FROM entries", [])
            .map_err(|e| ChainError::DatabaseError(format!("Failed to clear entries: {}", e)))?;

        for entry in entries {
            let payload_json = serde_json::to_string(&entry.payload)?;
            tx.execute(
                "INSERT INTO entries (position, timestamp, payload, previous_digest, digest, nonce)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    entry.position as i64,
                    entry.timestamp as i64,
                    payload_json,
                    entry.previous_digest,
                    entry.digest,
                    entry.nonce as i64,
                ],
            )
            .map_err(|e| ChainError::DatabaseError(format!("Failed to save entry: {}", e)))?;
        }

        // Commit all changes atomically
        tx.commit().map_err(|e| {
            ChainError::DatabaseError(format!("Failed to commit transaction: {}", e))
        })?;

        Ok(())
    }

    fn load_chain(&self) -> Result<Vec<Entry>, ChainError> {
        let conn_guard = self.conn.lock().map_err(|_| ChainError::DatabaseError("Mutex poisoned".to_string()))?;
        let mut stmt = conn_guard
            .prepare(
                "SELECT position, timestamp, payload, previous_digest, digest, nonce
                 FROM entries ORDER BY position ASC",
            )
            .map_err(|e| ChainError::DatabaseError(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| {
                let position: i64 = row.get(0)?;
                let timestamp: i64 = row.get(1)?;
                let payload_json: String = row.get(2)?;
                let previous_digest: String = row.get(3)?;
                let digest: String = row.get(4)?;
                let nonce: i64 = row.get(5)?;
                Ok((position, timestamp, payload_json, previous_digest, digest, nonce))
            })
            .map_err(|e| ChainError::DatabaseError(format!("Failed to query entries: {}", e)))?;

        let mut entries = Vec::new();
        for row in rows {
            let (position, timestamp, payload_json, previous_digest, digest, nonce) =
                row.map_err(|e| ChainError::DatabaseError(format!("Failed to load entry: {}", e)))?;

            let payload: Payload = serde_json::from_str(&payload_json).map_err(|e| {
                ChainError::CorruptSnapshot(format!("Bad payload at position {}: {}", position, e))
            })?;

            entries.push(Entry {
                position: position as u64,
                timestamp: timestamp as u64,
                payload,
                previous_digest,
                digest,
                nonce: nonce as u64,
            });
        }

        if entries.is_empty() {
            return Err(ChainError::SnapshotNotFound(self.path.clone()));
        }

        Ok(entries)
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.path)
    }
}

/// Simple in-memory persistence implementation useful for tests and ephemeral runs.
/// Clones share the same snapshot.
#[derive(Clone, Default)]
pub struct InMemoryPersistence {
    snapshot: Arc<Mutex<Option<Vec<Entry>>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for InMemoryPersistence {
    fn save_chain(&self, entries: &[Entry]) -> Result<(), ChainError> {
        let mut snapshot = self.snapshot.lock().map_err(|_| ChainError::DatabaseError("Mutex poisoned".to_string()))?;
        *snapshot = Some(entries.to_vec());
        Ok(())
    }

    fn load_chain(&self) -> Result<Vec<Entry>, ChainError> {
        let snapshot = self.snapshot.lock().map_err(|_| ChainError::DatabaseError("Mutex poisoned".to_string()))?;
        snapshot
            .clone()
            .ok_or_else(|| ChainError::SnapshotNotFound("memory".to_string()))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
