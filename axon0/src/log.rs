//! The event log contract and the run-scoped event writer.
//!
//! The log is the only shared mutable state in the kernel. Implementations
//! serialize writes; readers may proceed concurrently and see every event
//! appended before the read began. Dense per-run sequencing is the
//! *writer's* responsibility — the log only rejects duplicates.

use crate::event::{Event, EventKind};
use crate::id::RunId;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors from event-log operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum LogError {
    /// The backing store failed. Executors treat this as fatal to the run.
    #[error("storage error: {0}")]
    Storage(String),

    /// A persisted row could not be decoded.
    #[error("corrupt event at ({run_id}, {seq}): {message}")]
    Corrupt {
        /// Run the corrupt row belongs to.
        run_id: String,
        /// Sequence number of the corrupt row.
        seq: u64,
        /// What failed to decode.
        message: String,
    },

    /// An event with this `(run_id, seq)` already exists. A programmer bug —
    /// two writers sharing a run without sharing a counter.
    #[error("duplicate event ({run_id}, {seq})")]
    DuplicateSeq {
        /// Run id of the colliding event.
        run_id: String,
        /// Sequence number of the colliding event.
        seq: u64,
    },

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// The append-only event log.
///
/// Synchronous by design: appends are short serialized writes and the
/// reference backend (SQLite) has no async surface. Async executors call
/// these methods directly.
pub trait EventLog: Send + Sync {
    /// Append one event. Atomic and durable: once this returns `Ok`, the
    /// event is recoverable across process restarts.
    fn append(&self, event: Event) -> Result<(), LogError>;

    /// All events for a run, ordered by seq.
    fn query_by_run(&self, run_id: &RunId) -> Result<Vec<Event>, LogError>;

    /// Events of one kind for a run, ordered by seq.
    fn query_by_kind(&self, run_id: &RunId, kind: EventKind) -> Result<Vec<Event>, LogError>;

    /// Full ordered stream for deterministic replay. Alias for
    /// [`query_by_run`](EventLog::query_by_run); the name signals intent.
    fn replay(&self, run_id: &RunId) -> Result<Vec<Event>, LogError> {
        self.query_by_run(run_id)
    }
}

/// Run-scoped writer that allocates dense sequence numbers.
///
/// Clones share the counter, so every emitter in a run — executor,
/// budget manager, permission engine, stop checker, parallel task
/// workers — draws from the same series. The counter lock is held across
/// the append, which makes seq order equal append order.
#[derive(Clone)]
pub struct EventWriter {
    log: Arc<dyn EventLog>,
    run_id: RunId,
    next_seq: Arc<Mutex<u64>>,
}

impl EventWriter {
    /// Create a writer starting at seq 0.
    pub fn new(log: Arc<dyn EventLog>, run_id: RunId) -> Self {
        Self {
            log,
            run_id,
            next_seq: Arc::new(Mutex::new(0)),
        }
    }

    /// The run this writer emits into.
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// The underlying log.
    pub fn log(&self) -> &Arc<dyn EventLog> {
        &self.log
    }

    /// Allocate the next seq and append. On failure the seq is not
    /// consumed, so the series stays dense.
    pub fn emit(&self, kind: EventKind, payload: Value) -> Result<u64, LogError> {
        let mut next = self
            .next_seq
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let seq = *next;
        self.log
            .append(Event::new(self.run_id.clone(), seq, kind, payload))?;
        *next += 1;
        Ok(seq)
    }

    /// The seq the next emit would use.
    pub fn peek_seq(&self) -> u64 {
        *self
            .next_seq
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for EventWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventWriter")
            .field("run_id", &self.run_id)
            .field("next_seq", &self.peek_seq())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    /// Minimal in-memory log for writer tests.
    #[derive(Default)]
    struct VecLog {
        events: Mutex<HashMap<String, Vec<Event>>>,
    }

    impl EventLog for VecLog {
        fn append(&self, event: Event) -> Result<(), LogError> {
            let mut map = self.events.lock().unwrap();
            let run = map.entry(event.run_id.to_string()).or_default();
            if run.iter().any(|e| e.seq == event.seq) {
                return Err(LogError::DuplicateSeq {
                    run_id: event.run_id.to_string(),
                    seq: event.seq,
                });
            }
            run.push(event);
            Ok(())
        }

        fn query_by_run(&self, run_id: &RunId) -> Result<Vec<Event>, LogError> {
            Ok(self
                .events
                .lock()
                .unwrap()
                .get(run_id.as_str())
                .cloned()
                .unwrap_or_default())
        }

        fn query_by_kind(&self, run_id: &RunId, kind: EventKind) -> Result<Vec<Event>, LogError> {
            Ok(self
                .query_by_run(run_id)?
                .into_iter()
                .filter(|e| e.kind == kind)
                .collect())
        }
    }

    #[test]
    fn writer_allocates_dense_seqs() {
        let log = Arc::new(VecLog::default());
        let writer = EventWriter::new(log.clone(), RunId::new("r1"));
        for _ in 0..5 {
            writer.emit(EventKind::BudgetUpdated, json!({})).unwrap();
        }
        let events = log.query_by_run(&RunId::new("r1")).unwrap();
        let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn clones_share_the_counter() {
        let log = Arc::new(VecLog::default());
        let writer = EventWriter::new(log, RunId::new("r1"));
        let clone = writer.clone();
        writer.emit(EventKind::RunStarted, json!({})).unwrap();
        clone.emit(EventKind::RunFinished, json!({})).unwrap();
        assert_eq!(writer.peek_seq(), 2);
    }

    #[test]
    fn concurrent_emits_stay_dense() {
        let log = Arc::new(VecLog::default());
        let writer = EventWriter::new(log.clone(), RunId::new("r1"));
        let mut handles = vec![];
        for _ in 0..4 {
            let w = writer.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..25 {
                    w.emit(EventKind::BudgetUpdated, json!({})).unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let mut seqs: Vec<u64> = log
            .query_by_run(&RunId::new("r1"))
            .unwrap()
            .iter()
            .map(|e| e.seq)
            .collect();
        seqs.sort_unstable();
        assert_eq!(seqs, (0..100).collect::<Vec<u64>>());
    }
}
