//! Durable job state store
//!
//! A keyed mapping from job id to [`JobRecord`], persisted so that an
//! interrupted migration can resume. Records are self-describing JSON;
//! unknown fields survive a round-trip, so newer and older binaries can
//! share a state file.
//!
//! [`SqliteStore`] is the production engine: a single `state.db` file
//! with WAL journaling, one write transaction at a time. [`MemoryStore`]
//! backs unit tests and dry runs.

use crate::error::{StoreError, StoreResult};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Lifecycle state of a transfer job
///
/// Transitions form a DAG with no back-edges:
/// Pending -> InProgress -> {Completed, Failed}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// Persistent shadow of a transfer job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub source_path: String,
    pub destination_path: String,
    pub state: JobState,
    pub bytes_transferred: u64,
    pub total_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Fields written by other versions of the tool, preserved verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl JobRecord {
    /// Fresh Pending record for a job of `total_bytes`
    pub fn pending(
        id: impl Into<String>,
        source_path: impl Into<String>,
        destination_path: impl Into<String>,
        total_bytes: u64,
    ) -> Self {
        Self {
            id: id.into(),
            source_path: source_path.into(),
            destination_path: destination_path.into(),
            state: JobState::Pending,
            bytes_transferred: 0,
            total_bytes,
            error: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// Keyed, crash-safe job persistence
pub trait StateStore: Send + Sync {
    /// Upsert a record under its id
    fn save_job(&self, record: &JobRecord) -> StoreResult<()>;

    /// Fetch a record; `StoreError::JobNotFound` when absent
    fn get_job(&self, id: &str) -> StoreResult<JobRecord>;

    /// Flush outstanding writes to durable storage
    fn close(&self) -> StoreResult<()>;
}

/// Single-file embedded store backed by SQLite
///
/// The connection sits behind a mutex: one writer at a time, which is
/// exactly the serialization the checkpoint read-modify-write relies on.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the store at `path`, creating the `jobs` table
    /// if missing
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| StoreError::OpenFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS jobs (
                id     TEXT PRIMARY KEY,
                record TEXT NOT NULL
            )",
            [],
        )?;

        debug!(path = %path.display(), "state store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Ids of all records currently in a given state
    pub fn jobs_in_state(&self, state: JobState) -> StoreResult<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id, record FROM jobs")?;
        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            let record: String = row.get(1)?;
            Ok((id, record))
        })?;

        let mut ids = Vec::new();
        for row in rows {
            let (id, record) = row?;
            let record: JobRecord = serde_json::from_str(&record)?;
            if record.state == state {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}

impl StateStore for SqliteStore {
    fn save_job(&self, record: &JobRecord) -> StoreResult<()> {
        let data = serde_json::to_string(record)?;
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO jobs (id, record) VALUES (?1, ?2)",
            params![record.id, data],
        )?;
        Ok(())
    }

    fn get_job(&self, id: &str) -> StoreResult<JobRecord> {
        let data: Option<String> = self
            .conn
            .lock()
            .query_row("SELECT record FROM jobs WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;

        match data {
            Some(data) => Ok(serde_json::from_str(&data)?),
            None => Err(StoreError::JobNotFound { id: id.into() }),
        }
    }

    fn close(&self) -> StoreResult<()> {
        // wal_checkpoint returns a status row, so it cannot go through
        // pragma_update
        self.conn
            .lock()
            .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        Ok(())
    }
}

/// In-memory store for tests and dry runs
#[derive(Default)]
pub struct MemoryStore {
    jobs: Mutex<HashMap<String, JobRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held
    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }
}

impl StateStore for MemoryStore {
    fn save_job(&self, record: &JobRecord) -> StoreResult<()> {
        self.jobs
            .lock()
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn get_job(&self, id: &str) -> StoreResult<JobRecord> {
        self.jobs
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::JobNotFound { id: id.into() })
    }

    fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}
