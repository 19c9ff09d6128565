//! The task model shared by both workflow engines.

use axon0::id::TaskId;
use axon0::log::LogError;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Lifecycle states of a task. Once terminal, a task never mutates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskState {
    /// Declared but not yet schedulable.
    Pending,
    /// All dependencies satisfied; awaiting a worker slot.
    Ready,
    /// Executing.
    Running,
    /// Finished successfully. Terminal.
    Succeeded,
    /// Finished with an error. Terminal.
    Failed,
    /// Will never run (upstream failure or cancellation). Terminal.
    Skipped,
}

impl TaskState {
    /// Wire name (`PENDING`, `RUNNING`, …).
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "PENDING",
            TaskState::Ready => "READY",
            TaskState::Running => "RUNNING",
            TaskState::Succeeded => "SUCCEEDED",
            TaskState::Failed => "FAILED",
            TaskState::Skipped => "SKIPPED",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A business error from a task's callable.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{0}")]
pub struct TaskError(pub String);

impl From<&str> for TaskError {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for TaskError {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The invocable body of a task.
pub trait TaskFn: Send + Sync {
    /// Run the task. The future must be `'static` so the DAG engine can
    /// move it onto a worker.
    fn call(&self) -> BoxFuture<'static, Result<Value, TaskError>>;
}

impl<F, Fut> TaskFn for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, TaskError>> + Send + 'static,
{
    fn call(&self) -> BoxFuture<'static, Result<Value, TaskError>> {
        Box::pin(self())
    }
}

/// Build a task body from an async closure.
pub fn task_fn<F, Fut>(f: F) -> Arc<dyn TaskFn>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, TaskError>> + Send + 'static,
{
    Arc::new(f)
}

/// A unit of work with identity, dependencies, and a mutable lifecycle.
///
/// The executing engine exclusively owns its task nodes for the duration
/// of a run; `state`, `result`, and `error` are written only by it.
pub struct TaskNode {
    /// Stable opaque identity.
    pub id: TaskId,
    /// Human-readable name, used in events and error messages.
    pub name: String,
    /// Tasks that must succeed before this one may start.
    pub depends_on: Vec<TaskId>,
    /// Current lifecycle state.
    pub state: TaskState,
    /// Output on success.
    pub result: Option<Value>,
    /// Cause on failure.
    pub error: Option<String>,
    callable: Arc<dyn TaskFn>,
}

impl TaskNode {
    /// Create a pending task with a generated id and no dependencies.
    pub fn new(name: impl Into<String>, callable: Arc<dyn TaskFn>) -> Self {
        Self {
            id: TaskId::generate(),
            name: name.into(),
            depends_on: Vec::new(),
            state: TaskState::Pending,
            result: None,
            error: None,
            callable,
        }
    }

    /// Declare dependencies by id.
    pub fn with_dependencies(mut self, deps: Vec<TaskId>) -> Self {
        self.depends_on = deps;
        self
    }

    /// A shareable handle to the task body.
    pub fn callable(&self) -> Arc<dyn TaskFn> {
        Arc::clone(&self.callable)
    }

    /// Whether the task has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            TaskState::Succeeded | TaskState::Failed | TaskState::Skipped
        )
    }
}

impl fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskNode")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("depends_on", &self.depends_on)
            .field("state", &self.state)
            .finish()
    }
}

/// Engine-level failures for both workflow engines.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum TaskExecutionError {
    /// A declared dependency is not a member of the task set.
    #[error("task '{name}' depends on '{dependency}' which is not in the workflow")]
    MissingDependency {
        /// The task declaring the dependency.
        name: String,
        /// The missing dependency id.
        dependency: String,
    },

    /// The dependency graph contains a cycle.
    #[error("workflow '{name}' contains a cycle")]
    Cycle {
        /// The workflow name.
        name: String,
    },

    /// A task's callable failed. The run has already been finalized with
    /// outcome FAILED.
    #[error("task '{name}' failed: {message}")]
    TaskFailed {
        /// The failing task's name.
        name: String,
        /// The failure message.
        message: String,
    },

    /// The event log failed; the run aborted.
    #[error(transparent)]
    Log(#[from] LogError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn closure_task_fn_runs() {
        let body = task_fn(|| async { Ok(json!({"out": 1})) });
        assert_eq!(body.call().await.unwrap(), json!({"out": 1}));
    }

    #[test]
    fn new_tasks_are_pending_with_fresh_ids() {
        let a = TaskNode::new("a", task_fn(|| async { Ok(Value::Null) }));
        let b = TaskNode::new("b", task_fn(|| async { Ok(Value::Null) }));
        assert_eq!(a.state, TaskState::Pending);
        assert_ne!(a.id, b.id);
        assert!(!a.is_terminal());
    }

    #[test]
    fn state_wire_names() {
        assert_eq!(TaskState::Succeeded.as_str(), "SUCCEEDED");
        assert_eq!(
            serde_json::to_string(&TaskState::Pending).unwrap(),
            "\"PENDING\""
        );
    }
}
