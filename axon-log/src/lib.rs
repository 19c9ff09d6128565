#![deny(missing_docs)]
//! SQLite implementation of axon0's [`EventLog`] trait.
//!
//! One table, keyed `(run_id, seq)`. Payloads are stored as canonical JSON
//! text, timestamps as RFC 3339 UTC with millisecond precision. Writes are
//! serialized through a mutex-guarded connection; WAL journaling keeps
//! appends durable without a full fsync per insert.

use axon0::event::{Event, EventKind};
use axon0::hash::canonical_json;
use axon0::id::RunId;
use axon0::log::{EventLog, LogError};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, params};
use serde_json::Value;
use std::path::Path;
use std::sync::Mutex;

/// SQLite-backed event log.
///
/// Open a file-backed log for durability across restarts, or an in-memory
/// log for tests. All methods are safe to call from multiple threads.
pub struct SqliteEventLog {
    conn: Mutex<Connection>,
}

impl SqliteEventLog {
    /// Open (or create) a file-backed log.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LogError> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| LogError::Storage(format!("open {}: {e}", path.as_ref().display())))?;
        Self::init(conn)
    }

    /// Open an in-memory log. Contents vanish when the value is dropped.
    pub fn open_in_memory() -> Result<Self, LogError> {
        let conn =
            Connection::open_in_memory().map_err(|e| LogError::Storage(format!("open: {e}")))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, LogError> {
        // WAL + synchronous=NORMAL: crash-consistent within a run without
        // an fsync per append. In-memory databases report mode "memory".
        let _mode: String = conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .map_err(storage_err)?;
        conn.execute_batch("PRAGMA synchronous=NORMAL")
            .map_err(storage_err)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                run_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                kind TEXT NOT NULL,
                payload TEXT NOT NULL,
                PRIMARY KEY (run_id, seq)
            );
            "#,
        )
        .map_err(storage_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn rows_to_events(rows: Vec<(String, i64, String, String, String)>) -> Result<Vec<Event>, LogError> {
        rows.into_iter()
            .map(|(run_id, seq, timestamp, kind, payload)| {
                let seq = u64::try_from(seq).map_err(|_| LogError::Corrupt {
                    run_id: run_id.clone(),
                    seq: 0,
                    message: format!("negative seq {seq}"),
                })?;
                let kind = EventKind::parse(&kind).ok_or_else(|| LogError::Corrupt {
                    run_id: run_id.clone(),
                    seq,
                    message: format!("unknown event kind '{kind}'"),
                })?;
                let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(&timestamp)
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(|e| LogError::Corrupt {
                        run_id: run_id.clone(),
                        seq,
                        message: format!("bad timestamp '{timestamp}': {e}"),
                    })?;
                let payload: Value =
                    serde_json::from_str(&payload).map_err(|e| LogError::Corrupt {
                        run_id: run_id.clone(),
                        seq,
                        message: format!("bad payload: {e}"),
                    })?;
                Ok(Event {
                    run_id: RunId::new(run_id),
                    seq,
                    timestamp,
                    kind,
                    payload,
                })
            })
            .collect()
    }

    fn query<P: rusqlite::Params>(&self, sql: &str, bind: P) -> Result<Vec<Event>, LogError> {
        let conn = self
            .conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut stmt = conn.prepare(sql).map_err(storage_err)?;
        let rows = stmt
            .query_map(bind, |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(storage_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage_err)?;
        Self::rows_to_events(rows)
    }
}

fn storage_err(e: rusqlite::Error) -> LogError {
    LogError::Storage(e.to_string())
}

impl EventLog for SqliteEventLog {
    fn append(&self, event: Event) -> Result<(), LogError> {
        let payload = canonical_json(&event.payload);
        let timestamp = event.timestamp_rfc3339();
        let seq = i64::try_from(event.seq)
            .map_err(|_| LogError::Storage(format!("seq {} exceeds i64", event.seq)))?;
        let conn = self
            .conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let result = conn.execute(
            "INSERT INTO events (run_id, seq, timestamp, kind, payload) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.run_id.as_str(),
                seq,
                timestamp,
                event.kind.as_str(),
                payload
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                Err(LogError::DuplicateSeq {
                    run_id: event.run_id.to_string(),
                    seq: event.seq,
                })
            }
            Err(e) => Err(storage_err(e)),
        }
    }

    fn query_by_run(&self, run_id: &RunId) -> Result<Vec<Event>, LogError> {
        self.query(
            "SELECT run_id, seq, timestamp, kind, payload FROM events \
             WHERE run_id = ?1 ORDER BY seq",
            params![run_id.as_str()],
        )
    }

    fn query_by_kind(&self, run_id: &RunId, kind: EventKind) -> Result<Vec<Event>, LogError> {
        self.query(
            "SELECT run_id, seq, timestamp, kind, payload FROM events \
             WHERE run_id = ?1 AND kind = ?2 ORDER BY seq",
            params![run_id.as_str(), kind.as_str()],
        )
    }
}
