//! Dependency-graph execution with bounded parallelism.
//!
//! Validation happens before any event is emitted: unknown dependency
//! references and cycles are rejected (Kahn's algorithm). Scheduling then
//! repeats: submit every ready task up to the parallelism cap, wait for at
//! least one completion, repeat. On the first failure nothing new is
//! submitted but in-flight tasks finish — observability over cleanup.
//!
//! Workers emit their own `TaskStarted`/`TaskFinished` through clones of
//! the run's [`EventWriter`], so seq order reflects real append order
//! across parallel tasks.

use crate::task::{TaskError, TaskExecutionError, TaskNode, TaskState};
use axon0::event::EventKind;
use axon0::id::{RunId, TaskId};
use axon0::log::{EventLog, EventWriter, LogError};
use serde_json::json;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinSet;

/// A directed acyclic graph of tasks.
pub struct DagWorkflow {
    /// Workflow name, recorded in `RunStarted`.
    pub name: String,
    /// Member tasks. Dependency references point at members by id.
    pub tasks: Vec<TaskNode>,
}

impl DagWorkflow {
    /// Create an empty DAG.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Vec::new(),
        }
    }

    /// Add a task.
    pub fn add_task(&mut self, task: TaskNode) {
        self.tasks.push(task);
    }

    /// Check membership of every dependency and the absence of cycles.
    pub fn validate(&self) -> Result<(), TaskExecutionError> {
        let members: BTreeSet<&TaskId> = self.tasks.iter().map(|t| &t.id).collect();
        for task in &self.tasks {
            for dep in &task.depends_on {
                if !members.contains(dep) {
                    return Err(TaskExecutionError::MissingDependency {
                        name: task.name.clone(),
                        dependency: dep.to_string(),
                    });
                }
            }
        }

        // Kahn's algorithm: if a full topological order exists, no cycle.
        if self.kahn_order().len() != self.tasks.len() {
            return Err(TaskExecutionError::Cycle {
                name: self.name.clone(),
            });
        }
        Ok(())
    }

    /// A deterministic topological order: ties broken lexicographically on
    /// task id, so two calls over the same graph agree.
    pub fn topological_order(&self) -> Vec<TaskId> {
        self.kahn_order()
    }

    fn kahn_order(&self) -> Vec<TaskId> {
        let mut in_degree: HashMap<&TaskId, usize> =
            self.tasks.iter().map(|t| (&t.id, 0)).collect();
        let mut adjacency: HashMap<&TaskId, Vec<&TaskId>> =
            self.tasks.iter().map(|t| (&t.id, Vec::new())).collect();
        for task in &self.tasks {
            for dep in &task.depends_on {
                if let Some(neighbors) = adjacency.get_mut(dep) {
                    neighbors.push(&task.id);
                    if let Some(deg) = in_degree.get_mut(&task.id) {
                        *deg += 1;
                    }
                }
            }
        }

        let mut queue: VecDeque<&TaskId> = {
            let mut roots: Vec<&TaskId> = in_degree
                .iter()
                .filter(|(_, deg)| **deg == 0)
                .map(|(id, _)| *id)
                .collect();
            roots.sort();
            roots.into()
        };

        let mut order = Vec::with_capacity(self.tasks.len());
        while let Some(current) = queue.pop_front() {
            order.push(current.clone());
            let mut unlocked: Vec<&TaskId> = Vec::new();
            if let Some(neighbors) = adjacency.get(current) {
                for neighbor in neighbors {
                    if let Some(deg) = in_degree.get_mut(neighbor) {
                        *deg -= 1;
                        if *deg == 0 {
                            unlocked.push(neighbor);
                        }
                    }
                }
            }
            unlocked.sort();
            queue.extend(unlocked);
        }
        order
    }
}

/// What a worker reports back to the scheduler.
type WorkerOutcome = Result<(TaskId, Result<serde_json::Value, String>), LogError>;

/// Executes a [`DagWorkflow`] respecting dependencies, with at most
/// `max_parallel` tasks in flight.
pub struct DagExecutor {
    log: Arc<dyn EventLog>,
    max_parallel: usize,
    stop_flag: Option<Arc<AtomicBool>>,
}

impl DagExecutor {
    /// Create an executor writing to the given log.
    pub fn new(log: Arc<dyn EventLog>, max_parallel: usize) -> Self {
        Self {
            log,
            max_parallel: max_parallel.max(1),
            stop_flag: None,
        }
    }

    /// Install a cooperative stop flag, observed between task submissions.
    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop_flag = Some(flag);
        self
    }

    /// Execute the DAG. Returns the run id, or the first task failure
    /// after in-flight tasks have drained and the run is finalized.
    pub async fn run(
        &self,
        dag: &mut DagWorkflow,
        run_id: Option<RunId>,
    ) -> Result<RunId, TaskExecutionError> {
        dag.validate()?;

        let rid = run_id.unwrap_or_else(RunId::generate);
        let writer = EventWriter::new(Arc::clone(&self.log), rid.clone());
        writer.emit(EventKind::RunStarted, json!({"workflow": &dag.name}))?;

        if dag.tasks.is_empty() {
            writer.emit(
                EventKind::RunFinished,
                json!({"workflow": &dag.name, "outcome": "SUCCEEDED"}),
            )?;
            return Ok(rid);
        }

        let index_of: HashMap<TaskId, usize> = dag
            .tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.clone(), i))
            .collect();
        let mut pending: BTreeSet<TaskId> = dag.tasks.iter().map(|t| t.id.clone()).collect();
        let mut in_flight: JoinSet<WorkerOutcome> = JoinSet::new();
        let mut first_failure: Option<(String, String)> = None;
        let mut stopped = false;

        loop {
            if first_failure.is_none() && !stopped {
                if let Some(flag) = &self.stop_flag {
                    if flag.load(Ordering::SeqCst) {
                        stopped = true;
                        tracing::debug!(workflow = %dag.name, "stop flag observed; draining");
                    }
                }
            }

            if first_failure.is_none() && !stopped {
                let ready: Vec<TaskId> = pending
                    .iter()
                    .filter(|id| {
                        let task = &dag.tasks[index_of[*id]];
                        task.depends_on.iter().all(|dep| {
                            dag.tasks[index_of[dep]].state == TaskState::Succeeded
                        })
                    })
                    .cloned()
                    .collect();
                for id in ready {
                    if in_flight.len() >= self.max_parallel {
                        break;
                    }
                    pending.remove(&id);
                    let task = &mut dag.tasks[index_of[&id]];
                    task.state = TaskState::Running;
                    in_flight.spawn(Self::worker(
                        writer.clone(),
                        id,
                        task.name.clone(),
                        task.callable(),
                    ));
                }
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };
            let (task_id, outcome) = match joined {
                Ok(Ok(report)) => report,
                // Log failure inside a worker is fatal to the run.
                Ok(Err(log_err)) => return Err(log_err.into()),
                Err(join_err) => {
                    return Err(TaskExecutionError::TaskFailed {
                        name: "<worker>".into(),
                        message: join_err.to_string(),
                    });
                }
            };

            let task = &mut dag.tasks[index_of[&task_id]];
            match outcome {
                Ok(result) => {
                    task.state = TaskState::Succeeded;
                    task.result = Some(result);
                }
                Err(message) => {
                    task.state = TaskState::Failed;
                    task.error = Some(message.clone());
                    if first_failure.is_none() {
                        first_failure = Some((task.name.clone(), message));
                    }
                }
            }
        }

        if let Some((failed_name, message)) = first_failure {
            writer.emit(
                EventKind::RunFinished,
                json!({
                    "workflow": &dag.name,
                    "outcome": "FAILED",
                    "failed_tasks": [&failed_name],
                }),
            )?;
            return Err(TaskExecutionError::TaskFailed {
                name: failed_name,
                message,
            });
        }

        let outcome = if stopped { "STOPPED" } else { "SUCCEEDED" };
        writer.emit(
            EventKind::RunFinished,
            json!({"workflow": &dag.name, "outcome": outcome}),
        )?;
        Ok(rid)
    }

    /// Emits the task's start/finish events and reports the result.
    async fn worker(
        writer: EventWriter,
        task_id: TaskId,
        task_name: String,
        callable: Arc<dyn crate::task::TaskFn>,
    ) -> WorkerOutcome {
        writer.emit(
            EventKind::TaskStarted,
            json!({"task_id": &task_id, "task_name": &task_name}),
        )?;
        let outcome: Result<serde_json::Value, TaskError> = callable.call().await;
        match &outcome {
            Ok(_) => {
                writer.emit(
                    EventKind::TaskFinished,
                    json!({
                        "task_id": &task_id,
                        "task_name": &task_name,
                        "state": "SUCCEEDED",
                    }),
                )?;
            }
            Err(error) => {
                writer.emit(
                    EventKind::TaskFinished,
                    json!({
                        "task_id": &task_id,
                        "task_name": &task_name,
                        "state": "FAILED",
                        "error": &error.0,
                    }),
                )?;
            }
        }
        Ok((task_id, outcome.map_err(|e| e.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::task_fn;
    use axon_log::SqliteEventLog;
    use serde_json::Value;
    use std::time::{Duration, Instant};

    fn log() -> Arc<dyn EventLog> {
        Arc::new(SqliteEventLog::open_in_memory().unwrap())
    }

    fn noop(name: &str) -> TaskNode {
        TaskNode::new(name, task_fn(|| async { Ok(Value::Null) }))
    }

    #[test]
    fn missing_dependency_is_rejected() {
        let mut dag = DagWorkflow::new("d");
        let ghost = TaskId::new("ghost");
        let task = noop("a").with_dependencies(vec![ghost]);
        dag.add_task(task);
        let err = dag.validate().unwrap_err();
        assert!(matches!(err, TaskExecutionError::MissingDependency { .. }));
    }

    #[test]
    fn cycle_is_rejected() {
        let mut dag = DagWorkflow::new("d");
        let mut a = noop("a");
        let mut b = noop("b");
        let (a_id, b_id) = (a.id.clone(), b.id.clone());
        a.depends_on = vec![b_id];
        b.depends_on = vec![a_id];
        dag.add_task(a);
        dag.add_task(b);
        let err = dag.validate().unwrap_err();
        assert!(matches!(err, TaskExecutionError::Cycle { .. }));
    }

    #[test]
    fn topological_order_is_deterministic() {
        let build = || {
            let mut dag = DagWorkflow::new("d");
            let root = noop("root");
            let root_id = root.id.clone();
            dag.add_task(root);
            for name in ["x", "y", "z"] {
                let mut task = noop(name);
                task.id = TaskId::new(format!("task-{name}"));
                task.depends_on = vec![root_id.clone()];
                dag.add_task(task);
            }
            dag
        };
        let mut dag = build();
        // Pin the root id so both instances are comparable.
        dag.tasks[0].id = TaskId::new("task-root");
        for t in dag.tasks.iter_mut().skip(1) {
            t.depends_on = vec![TaskId::new("task-root")];
        }
        let order_a = dag.topological_order();
        let order_b = dag.topological_order();
        assert_eq!(order_a, order_b);
        assert_eq!(order_a[0], TaskId::new("task-root"));
        assert_eq!(
            order_a[1..].to_vec(),
            vec![
                TaskId::new("task-x"),
                TaskId::new("task-y"),
                TaskId::new("task-z")
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn diamond_runs_in_parallel() {
        let log = log();
        let mut dag = DagWorkflow::new("diamond");
        let sleeper = || {
            task_fn(|| async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(Value::Null)
            })
        };
        let a = TaskNode::new("A", sleeper());
        let a_id = a.id.clone();
        let b = TaskNode::new("B", sleeper()).with_dependencies(vec![a_id.clone()]);
        let c = TaskNode::new("C", sleeper()).with_dependencies(vec![a_id.clone()]);
        let (b_id, c_id) = (b.id.clone(), c.id.clone());
        let d = TaskNode::new("D", sleeper()).with_dependencies(vec![b_id.clone(), c_id.clone()]);
        dag.add_task(a);
        dag.add_task(b);
        dag.add_task(c);
        dag.add_task(d);

        let start = Instant::now();
        let rid = DagExecutor::new(log.clone(), 3)
            .run(&mut dag, None)
            .await
            .unwrap();
        assert!(start.elapsed() < Duration::from_millis(190));

        // B and C overlapped: each started before the other finished.
        let events = log.query_by_run(&rid).unwrap();
        let seq_of = |kind: EventKind, id: &TaskId| {
            events
                .iter()
                .find(|e| e.kind == kind && e.payload["task_id"] == json!(id))
                .map(|e| e.seq)
                .unwrap()
        };
        assert!(seq_of(EventKind::TaskStarted, &b_id) < seq_of(EventKind::TaskFinished, &c_id));
        assert!(seq_of(EventKind::TaskStarted, &c_id) < seq_of(EventKind::TaskFinished, &b_id));

        // One dense seq series.
        let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, (0..events.len() as u64).collect::<Vec<u64>>());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn first_failure_stops_submission_but_drains() {
        let log = log();
        let mut dag = DagWorkflow::new("d");
        let boom = TaskNode::new("boom", task_fn(|| async { Err("kaput".into()) }));
        let boom_id = boom.id.clone();
        let slow = TaskNode::new(
            "slow",
            task_fn(|| async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok(Value::Null)
            }),
        );
        let downstream = TaskNode::new("downstream", task_fn(|| async { Ok(Value::Null) }))
            .with_dependencies(vec![boom_id]);
        dag.add_task(boom);
        dag.add_task(slow);
        dag.add_task(downstream);

        let err = DagExecutor::new(log.clone(), 2)
            .run(&mut dag, Some(RunId::new("r1")))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskExecutionError::TaskFailed { .. }));

        // In-flight "slow" finished; "downstream" never started.
        assert_eq!(dag.tasks[1].state, TaskState::Succeeded);
        assert_eq!(dag.tasks[2].state, TaskState::Pending);

        let events = log.query_by_run(&RunId::new("r1")).unwrap();
        let last = events.last().unwrap();
        assert_eq!(last.payload["outcome"], "FAILED");
        assert_eq!(last.payload["failed_tasks"], json!(["boom"]));
    }

    #[tokio::test]
    async fn stop_flag_prevents_new_submissions() {
        let log = log();
        let flag = Arc::new(AtomicBool::new(false));
        let mut dag = DagWorkflow::new("d");
        let flag_in_task = flag.clone();
        let first = TaskNode::new(
            "first",
            task_fn(move || {
                let flag = flag_in_task.clone();
                async move {
                    flag.store(true, Ordering::SeqCst);
                    Ok(Value::Null)
                }
            }),
        );
        let first_id = first.id.clone();
        let second = TaskNode::new("second", task_fn(|| async { Ok(Value::Null) }))
            .with_dependencies(vec![first_id]);
        dag.add_task(first);
        dag.add_task(second);

        let rid = DagExecutor::new(log.clone(), 1)
            .with_stop_flag(flag)
            .run(&mut dag, None)
            .await
            .unwrap();

        assert_eq!(dag.tasks[0].state, TaskState::Succeeded);
        assert_eq!(dag.tasks[1].state, TaskState::Pending);
        let events = log.query_by_run(&rid).unwrap();
        assert_eq!(events.last().unwrap().payload["outcome"], "STOPPED");
    }

    #[tokio::test]
    async fn empty_dag_succeeds() {
        let log = log();
        let mut dag = DagWorkflow::new("empty");
        let rid = DagExecutor::new(log.clone(), 2)
            .run(&mut dag, None)
            .await
            .unwrap();
        let events = log.query_by_run(&rid).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].payload["outcome"], "SUCCEEDED");
    }
}
