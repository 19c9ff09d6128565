#![deny(missing_docs)]
//! Workflow engines for axon — deterministic task graphs over the event log.
//!
//! Two executors share one task model:
//!
//! - [`linear::WorkflowExecutor`] runs tasks in declared order on the
//!   caller's task.
//! - [`dag::DagExecutor`] runs a validated dependency graph with bounded
//!   parallelism; parallel workers share the run's sequence counter so the
//!   log stays dense and append-ordered.
//!
//! Both emit the canonical `RunStarted → Task* → RunFinished` sequence and
//! surface the first task failure as [`task::TaskExecutionError`] after the
//! run is finalized in the log.

pub mod dag;
pub mod linear;
pub mod task;

pub use dag::{DagExecutor, DagWorkflow};
pub use linear::{Workflow, WorkflowExecutor};
pub use task::{TaskError, TaskExecutionError, TaskFn, TaskNode, TaskState, task_fn};
