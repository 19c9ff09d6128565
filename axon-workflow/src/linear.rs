//! Sequential workflow execution.
//!
//! Tasks run in declared order on the caller's task. The emitted sequence
//! is `RunStarted → (TaskStarted → TaskFinished)+ → RunFinished`; the
//! first task failure finalizes the run and surfaces as an error, leaving
//! later tasks PENDING.

use crate::task::{TaskExecutionError, TaskNode, TaskState};
use axon0::event::EventKind;
use axon0::id::RunId;
use axon0::log::{EventLog, EventWriter};
use serde_json::json;
use std::sync::Arc;

/// An ordered sequence of tasks.
pub struct Workflow {
    /// Workflow name, recorded in `RunStarted`.
    pub name: String,
    /// Tasks in execution order.
    pub tasks: Vec<TaskNode>,
}

impl Workflow {
    /// Create an empty workflow.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Vec::new(),
        }
    }

    /// Append a task.
    pub fn add_task(&mut self, task: TaskNode) {
        self.tasks.push(task);
    }
}

/// Executes a [`Workflow`] linearly, emitting events for every transition.
pub struct WorkflowExecutor {
    log: Arc<dyn EventLog>,
}

impl WorkflowExecutor {
    /// Create an executor writing to the given log.
    pub fn new(log: Arc<dyn EventLog>) -> Self {
        Self { log }
    }

    /// Execute all tasks in order. Returns the run id.
    ///
    /// On task failure the task is marked FAILED, `TaskFinished` and a
    /// FAILED `RunFinished` are emitted, and the error propagates.
    pub async fn run(
        &self,
        workflow: &mut Workflow,
        run_id: Option<RunId>,
    ) -> Result<RunId, TaskExecutionError> {
        let rid = run_id.unwrap_or_else(RunId::generate);
        let writer = EventWriter::new(Arc::clone(&self.log), rid.clone());

        writer.emit(EventKind::RunStarted, json!({"workflow": &workflow.name}))?;

        for task in &mut workflow.tasks {
            task.state = TaskState::Running;
            writer.emit(
                EventKind::TaskStarted,
                json!({"task_id": &task.id, "task_name": &task.name}),
            )?;

            match task.callable().call().await {
                Ok(result) => {
                    task.result = Some(result);
                    task.state = TaskState::Succeeded;
                    writer.emit(
                        EventKind::TaskFinished,
                        json!({
                            "task_id": &task.id,
                            "task_name": &task.name,
                            "state": task.state.as_str(),
                        }),
                    )?;
                }
                Err(error) => {
                    task.state = TaskState::Failed;
                    task.error = Some(error.0.clone());
                    tracing::debug!(task = %task.name, error = %error, "task failed");
                    writer.emit(
                        EventKind::TaskFinished,
                        json!({
                            "task_id": &task.id,
                            "task_name": &task.name,
                            "state": task.state.as_str(),
                            "error": &error.0,
                        }),
                    )?;
                    writer.emit(
                        EventKind::RunFinished,
                        json!({
                            "workflow": &workflow.name,
                            "outcome": "FAILED",
                            "failed_task": &task.name,
                        }),
                    )?;
                    return Err(TaskExecutionError::TaskFailed {
                        name: task.name.clone(),
                        message: error.0,
                    });
                }
            }
        }

        writer.emit(
            EventKind::RunFinished,
            json!({"workflow": &workflow.name, "outcome": "SUCCEEDED"}),
        )?;
        Ok(rid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::task_fn;
    use axon_log::SqliteEventLog;
    use serde_json::{Value, json};

    fn log() -> Arc<dyn EventLog> {
        Arc::new(SqliteEventLog::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn success_emits_canonical_sequence() {
        let log = log();
        let mut wf = Workflow::new("wf");
        wf.add_task(TaskNode::new("t1", task_fn(|| async { Ok(json!({"a": 1})) })));
        wf.add_task(TaskNode::new("t2", task_fn(|| async { Ok(json!({"b": 2})) })));

        let rid = WorkflowExecutor::new(log.clone())
            .run(&mut wf, None)
            .await
            .unwrap();

        let events = log.query_by_run(&rid).unwrap();
        let kinds: Vec<&str> = events.iter().map(|e| e.kind.as_str()).collect();
        assert_eq!(
            kinds,
            vec![
                "RunStarted",
                "TaskStarted",
                "TaskFinished",
                "TaskStarted",
                "TaskFinished",
                "RunFinished"
            ]
        );
        let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(events[5].payload["outcome"], "SUCCEEDED");
        assert_eq!(wf.tasks[0].state, TaskState::Succeeded);
        assert_eq!(wf.tasks[0].result, Some(json!({"a": 1})));
    }

    #[tokio::test]
    async fn failure_finalizes_run_and_propagates() {
        let log = log();
        let mut wf = Workflow::new("wf");
        wf.add_task(TaskNode::new("ok", task_fn(|| async { Ok(Value::Null) })));
        wf.add_task(TaskNode::new(
            "boom",
            task_fn(|| async { Err("exploded".into()) }),
        ));
        wf.add_task(TaskNode::new("never", task_fn(|| async { Ok(Value::Null) })));

        let err = WorkflowExecutor::new(log.clone())
            .run(&mut wf, Some(RunId::new("r1")))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskExecutionError::TaskFailed { .. }));

        let events = log.query_by_run(&RunId::new("r1")).unwrap();
        let last = events.last().unwrap();
        assert_eq!(last.kind, EventKind::RunFinished);
        assert_eq!(last.payload["outcome"], "FAILED");
        assert_eq!(last.payload["failed_task"], "boom");

        let failed = &events[events.len() - 2];
        assert_eq!(failed.kind, EventKind::TaskFinished);
        assert_eq!(failed.payload["state"], "FAILED");
        assert_eq!(failed.payload["error"], "exploded");

        assert_eq!(wf.tasks[1].state, TaskState::Failed);
        assert_eq!(wf.tasks[2].state, TaskState::Pending);
    }

    #[tokio::test]
    async fn empty_workflow_succeeds() {
        let log = log();
        let mut wf = Workflow::new("empty");
        let rid = WorkflowExecutor::new(log.clone())
            .run(&mut wf, None)
            .await
            .unwrap();
        let events = log.query_by_run(&rid).unwrap();
        let kinds: Vec<&str> = events.iter().map(|e| e.kind.as_str()).collect();
        assert_eq!(kinds, vec!["RunStarted", "RunFinished"]);
    }
}
