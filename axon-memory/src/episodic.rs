//! Episodic memory — run summaries derived from the event log.

use axon0::event::EventKind;
use axon0::id::RunId;
use axon0::log::{EventLog, LogError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A run summary folded out of its event stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    /// The summarized run.
    pub run_id: String,
    /// Workflow name from `RunStarted`.
    pub workflow_name: String,
    /// Outcome from the terminal `RunFinished`, or `"UNKNOWN"`.
    pub outcome: String,
    /// Total events in the run.
    pub total_events: usize,
    /// Distinct tasks that started.
    pub task_count: usize,
    /// Distinct tasks that finished SUCCEEDED.
    pub tasks_succeeded: usize,
    /// Distinct tasks that finished FAILED.
    pub tasks_failed: usize,
    /// Tool invocations (counted on `ToolCallStarted`).
    pub tool_calls: usize,
    /// When the run started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the run finished.
    pub finished_at: Option<DateTime<Utc>>,
    /// The first failed task's name, when the run failed.
    pub failed_task: Option<String>,
}

/// Derives and memoizes run summaries.
pub struct EpisodicStore {
    log: Arc<dyn EventLog>,
    cache: HashMap<String, EpisodeSummary>,
}

impl EpisodicStore {
    /// Create a store over a log.
    pub fn new(log: Arc<dyn EventLog>) -> Self {
        Self {
            log,
            cache: HashMap::new(),
        }
    }

    /// Summarize a run. Results are cached per run id until invalidated.
    pub fn summarize(&mut self, run_id: &RunId) -> Result<EpisodeSummary, LogError> {
        if let Some(summary) = self.cache.get(run_id.as_str()) {
            return Ok(summary.clone());
        }

        let events = self.log.replay(run_id)?;
        if events.is_empty() {
            return Ok(EpisodeSummary {
                run_id: run_id.to_string(),
                outcome: "UNKNOWN".into(),
                ..EpisodeSummary::default()
            });
        }

        let mut summary = EpisodeSummary {
            run_id: run_id.to_string(),
            outcome: "UNKNOWN".into(),
            total_events: events.len(),
            ..EpisodeSummary::default()
        };

        let mut started: HashSet<String> = HashSet::new();
        let mut succeeded: HashSet<String> = HashSet::new();
        let mut failed: HashSet<String> = HashSet::new();

        for event in &events {
            match event.kind {
                EventKind::RunStarted => {
                    summary.workflow_name = event.payload["workflow"]
                        .as_str()
                        .unwrap_or_default()
                        .to_string();
                    summary.started_at = Some(event.timestamp);
                }
                EventKind::RunFinished => {
                    summary.outcome = event.payload["outcome"]
                        .as_str()
                        .unwrap_or("UNKNOWN")
                        .to_string();
                    summary.finished_at = Some(event.timestamp);
                    if summary.outcome == "FAILED" {
                        // The linear engine records `failed_task`, the DAG
                        // engine a `failed_tasks` list.
                        summary.failed_task = event.payload["failed_task"]
                            .as_str()
                            .map(str::to_string)
                            .or_else(|| {
                                event.payload["failed_tasks"]
                                    .as_array()
                                    .and_then(|names| names.first())
                                    .and_then(|name| name.as_str())
                                    .map(str::to_string)
                            });
                    }
                }
                EventKind::TaskStarted => {
                    if let Some(id) = event.payload["task_id"].as_str() {
                        started.insert(id.to_string());
                    }
                }
                EventKind::TaskFinished => {
                    let id = event.payload["task_id"].as_str().unwrap_or_default();
                    match event.payload["state"].as_str() {
                        Some("SUCCEEDED") => {
                            succeeded.insert(id.to_string());
                        }
                        Some("FAILED") => {
                            failed.insert(id.to_string());
                        }
                        _ => {}
                    }
                }
                EventKind::ToolCallStarted => summary.tool_calls += 1,
                _ => {}
            }
        }

        summary.task_count = started.len();
        summary.tasks_succeeded = succeeded.len();
        summary.tasks_failed = failed.len();

        self.cache.insert(run_id.to_string(), summary.clone());
        Ok(summary)
    }

    /// Summarize several runs.
    pub fn list_runs(&mut self, run_ids: &[RunId]) -> Result<Vec<EpisodeSummary>, LogError> {
        run_ids.iter().map(|rid| self.summarize(rid)).collect()
    }

    /// Drop a cached summary (e.g. after new events were appended).
    pub fn invalidate(&mut self, run_id: &RunId) {
        self.cache.remove(run_id.as_str());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axon0::log::EventWriter;
    use axon_log::SqliteEventLog;
    use serde_json::json;

    fn seeded_log() -> (Arc<dyn EventLog>, RunId) {
        let log: Arc<dyn EventLog> = Arc::new(SqliteEventLog::open_in_memory().unwrap());
        let run_id = RunId::new("r1");
        let writer = EventWriter::new(log.clone(), run_id.clone());
        writer
            .emit(EventKind::RunStarted, json!({"workflow": "pipeline"}))
            .unwrap();
        writer
            .emit(EventKind::TaskStarted, json!({"task_id": "t1", "task_name": "fetch"}))
            .unwrap();
        writer
            .emit(
                EventKind::ToolCallStarted,
                json!({"tool_name": "http", "side_effect": "READ", "input": {}}),
            )
            .unwrap();
        writer
            .emit(
                EventKind::ToolCallFinished,
                json!({"tool_name": "http", "success": true}),
            )
            .unwrap();
        writer
            .emit(
                EventKind::TaskFinished,
                json!({"task_id": "t1", "task_name": "fetch", "state": "SUCCEEDED"}),
            )
            .unwrap();
        writer
            .emit(EventKind::TaskStarted, json!({"task_id": "t2", "task_name": "parse"}))
            .unwrap();
        writer
            .emit(
                EventKind::TaskFinished,
                json!({"task_id": "t2", "task_name": "parse", "state": "FAILED", "error": "bad input"}),
            )
            .unwrap();
        writer
            .emit(
                EventKind::RunFinished,
                json!({"workflow": "pipeline", "outcome": "FAILED", "failed_task": "parse"}),
            )
            .unwrap();
        (log, run_id)
    }

    #[test]
    fn summary_counts_match_the_stream() {
        let (log, run_id) = seeded_log();
        let mut store = EpisodicStore::new(log);
        let summary = store.summarize(&run_id).unwrap();

        assert_eq!(summary.workflow_name, "pipeline");
        assert_eq!(summary.outcome, "FAILED");
        assert_eq!(summary.total_events, 8);
        assert_eq!(summary.task_count, 2);
        assert_eq!(summary.tasks_succeeded, 1);
        assert_eq!(summary.tasks_failed, 1);
        assert_eq!(summary.tool_calls, 1);
        assert_eq!(summary.failed_task.as_deref(), Some("parse"));
        assert!(summary.started_at.is_some());
        assert!(summary.finished_at.is_some());
    }

    #[test]
    fn dag_failed_tasks_list_is_understood() {
        let log: Arc<dyn EventLog> = Arc::new(SqliteEventLog::open_in_memory().unwrap());
        let run_id = RunId::new("r2");
        let writer = EventWriter::new(log.clone(), run_id.clone());
        writer
            .emit(EventKind::RunStarted, json!({"workflow": "dag"}))
            .unwrap();
        writer
            .emit(
                EventKind::RunFinished,
                json!({"workflow": "dag", "outcome": "FAILED", "failed_tasks": ["boom"]}),
            )
            .unwrap();
        let mut store = EpisodicStore::new(log);
        let summary = store.summarize(&run_id).unwrap();
        assert_eq!(summary.failed_task.as_deref(), Some("boom"));
    }

    #[test]
    fn summaries_are_memoized_until_invalidated() {
        let (log, run_id) = seeded_log();
        let mut store = EpisodicStore::new(log.clone());
        let first = store.summarize(&run_id).unwrap();

        // Append one more event behind the cache's back.
        let writer = EventWriter::new(log, RunId::new("other"));
        writer
            .emit(EventKind::RunStarted, json!({"workflow": "x"}))
            .unwrap();

        let cached = store.summarize(&run_id).unwrap();
        assert_eq!(first, cached);

        store.invalidate(&run_id);
        let fresh = store.summarize(&run_id).unwrap();
        assert_eq!(fresh.total_events, first.total_events);
    }

    #[test]
    fn unknown_run_summarizes_as_unknown() {
        let log: Arc<dyn EventLog> = Arc::new(SqliteEventLog::open_in_memory().unwrap());
        let mut store = EpisodicStore::new(log);
        let summary = store.summarize(&RunId::new("ghost")).unwrap();
        assert_eq!(summary.outcome, "UNKNOWN");
        assert_eq!(summary.total_events, 0);
    }
}
