#![deny(missing_docs)]
//! Replay — deterministic reconstruction of runs from the event log.
//!
//! STRICT mode reads a run back exactly as recorded. REEXECUTE mode
//! additionally re-runs tools whose recorded side effect is `PURE`
//! through a caller-supplied executor and overlays their fresh outputs,
//! tagged `reexecuted`. Comparison checks whether two runs share the
//! same kind structure.

use axon0::event::{Event, EventKind};
use axon0::id::RunId;
use axon0::log::{EventLog, LogError};
use futures::future::BoxFuture;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;

/// How tool calls are handled during replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayMode {
    /// Use recorded outputs only.
    Strict,
    /// Re-execute PURE tools; mock everything else from the record.
    Reexecute,
}

/// Caller-supplied executor for re-running recorded tool calls.
pub trait ToolExecutor: Send + Sync {
    /// Execute `tool_name` with the recorded input.
    fn execute(&self, tool_name: &str, input: &Value) -> BoxFuture<'static, Result<Value, String>>;
}

/// Build a tool executor from an async closure.
pub fn tool_executor<F, Fut>(f: F) -> Arc<dyn ToolExecutor>
where
    F: Fn(&str, &Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, String>> + Send + 'static,
{
    struct Closure<F>(F);

    impl<F, Fut> ToolExecutor for Closure<F>
    where
        F: Fn(&str, &Value) -> Fut + Send + Sync,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        fn execute(
            &self,
            tool_name: &str,
            input: &Value,
        ) -> BoxFuture<'static, Result<Value, String>> {
            Box::pin((self.0)(tool_name, input))
        }
    }

    Arc::new(Closure(f))
}

/// A replayed run.
#[derive(Debug, Clone)]
pub struct ReplayResult {
    /// The replayed run's id.
    pub run_id: RunId,
    /// The full ordered event stream.
    pub events: Vec<Event>,
    /// `seq → payload` for every `ToolCallFinished`, with REEXECUTE
    /// overlays applied.
    pub tool_outputs: BTreeMap<u64, Value>,
    /// Whether the run's terminal `RunFinished` reported SUCCEEDED.
    pub success: bool,
    /// Why the replay itself failed, if it did.
    pub error: Option<String>,
}

impl ReplayResult {
    /// Task lifecycle events only.
    pub fn task_events(&self) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| matches!(e.kind, EventKind::TaskStarted | EventKind::TaskFinished))
            .collect()
    }

    /// Tool call events only.
    pub fn tool_call_events(&self) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| {
                matches!(
                    e.kind,
                    EventKind::ToolCallStarted | EventKind::ToolCallFinished
                )
            })
            .collect()
    }
}

/// Comparison of two runs' event streams.
#[derive(Debug, Clone)]
pub struct RunComparison {
    /// First run.
    pub run_id_a: RunId,
    /// Second run.
    pub run_id_b: RunId,
    /// Event count of the first run.
    pub events_a_count: usize,
    /// Event count of the second run.
    pub events_b_count: usize,
    /// Whether the kind sequences are element-wise equal.
    pub same_structure: bool,
    /// Kind sequence of the first run.
    pub kinds_a: Vec<EventKind>,
    /// Kind sequence of the second run.
    pub kinds_b: Vec<EventKind>,
}

/// Replays runs from an event log.
pub struct ReplayEngine {
    log: Arc<dyn EventLog>,
}

impl ReplayEngine {
    /// Create an engine over a log.
    pub fn new(log: Arc<dyn EventLog>) -> Self {
        Self { log }
    }

    /// Replay a run.
    ///
    /// `executor` is consulted only in [`ReplayMode::Reexecute`], for
    /// events recorded with `side_effect == "PURE"`. A re-execution
    /// failure aborts the replay with an error string; log read failures
    /// propagate as [`LogError`].
    pub async fn replay(
        &self,
        run_id: &RunId,
        mode: ReplayMode,
        executor: Option<&Arc<dyn ToolExecutor>>,
    ) -> Result<ReplayResult, LogError> {
        let events = self.log.replay(run_id)?;
        if events.is_empty() {
            return Ok(ReplayResult {
                run_id: run_id.clone(),
                events,
                tool_outputs: BTreeMap::new(),
                success: false,
                error: Some(format!("No events found for run {run_id}")),
            });
        }

        let mut tool_outputs: BTreeMap<u64, Value> = BTreeMap::new();
        let mut reexecute_error: Option<String> = None;

        for (position, event) in events.iter().enumerate() {
            if event.kind == EventKind::ToolCallFinished {
                // An overlay written by an earlier re-execution wins.
                tool_outputs
                    .entry(event.seq)
                    .or_insert_with(|| event.payload.clone());
            }

            if mode == ReplayMode::Reexecute && event.kind == EventKind::ToolCallStarted {
                let Some(executor) = executor else { continue };
                if event.payload["side_effect"] != "PURE" {
                    continue;
                }
                let tool_name = event.payload["tool_name"].as_str().unwrap_or_default();
                let input = event
                    .payload
                    .get("input")
                    .cloned()
                    .unwrap_or_else(|| json!({}));

                match executor.execute(tool_name, &input).await {
                    Ok(output) => {
                        // Overlay onto the matching ToolCallFinished.
                        let finished = events[position + 1..].iter().find(|e| {
                            e.kind == EventKind::ToolCallFinished
                                && e.payload["tool_name"] == event.payload["tool_name"]
                        });
                        if let Some(finished) = finished {
                            let mut payload = finished.payload.clone();
                            payload["output"] = output;
                            payload["reexecuted"] = Value::Bool(true);
                            tool_outputs.insert(finished.seq, payload);
                        }
                    }
                    Err(error) => {
                        reexecute_error =
                            Some(format!("Re-execution of '{tool_name}' failed: {error}"));
                        break;
                    }
                }
            }
        }

        if let Some(error) = reexecute_error {
            return Ok(ReplayResult {
                run_id: run_id.clone(),
                events,
                tool_outputs,
                success: false,
                error: Some(error),
            });
        }

        let success = events
            .iter()
            .filter(|e| e.kind == EventKind::RunFinished)
            .next_back()
            .map(|e| e.payload["outcome"] == "SUCCEEDED")
            .unwrap_or(false);

        Ok(ReplayResult {
            run_id: run_id.clone(),
            events,
            tool_outputs,
            success,
            error: None,
        })
    }

    /// Compare two runs by their kind sequences.
    pub fn compare_runs(
        &self,
        run_id_a: &RunId,
        run_id_b: &RunId,
    ) -> Result<RunComparison, LogError> {
        let events_a = self.log.replay(run_id_a)?;
        let events_b = self.log.replay(run_id_b)?;
        let kinds_a: Vec<EventKind> = events_a.iter().map(|e| e.kind).collect();
        let kinds_b: Vec<EventKind> = events_b.iter().map(|e| e.kind).collect();
        Ok(RunComparison {
            run_id_a: run_id_a.clone(),
            run_id_b: run_id_b.clone(),
            events_a_count: events_a.len(),
            events_b_count: events_b.len(),
            same_structure: kinds_a == kinds_b,
            kinds_a,
            kinds_b,
        })
    }
}
