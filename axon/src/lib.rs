#![deny(missing_docs)]
//! # axon — umbrella crate
//!
//! A single import surface for the axon agent orchestration kernel.
//! Re-exports the member crates behind feature flags, plus a [`prelude`]
//! for the happy path: an event log, a governed executor, and the derived
//! views over its run.

#[cfg(feature = "agent")]
pub use axon_agent;
#[cfg(feature = "eval")]
pub use axon_eval;
#[cfg(feature = "governance")]
pub use axon_governance;
#[cfg(feature = "core")]
pub use axon_log;
#[cfg(feature = "memory")]
pub use axon_memory;
#[cfg(feature = "core")]
pub use axon_provider;
#[cfg(feature = "replay")]
pub use axon_replay;
#[cfg(feature = "rlm")]
pub use axon_rlm;
#[cfg(feature = "sandbox")]
pub use axon_sandbox;
#[cfg(feature = "session")]
pub use axon_session;
#[cfg(feature = "core")]
pub use axon_tool;
#[cfg(feature = "workflow")]
pub use axon_workflow;
#[cfg(feature = "core")]
pub use axon0;

/// Happy-path imports for composing axon systems.
pub mod prelude {
    #[cfg(feature = "core")]
    pub use axon0::{
        Event, EventKind, EventLog, EventWriter, LogError, RunId, SessionId, SideEffect, TaskId,
        canonical_json, hash_value,
    };

    #[cfg(feature = "core")]
    pub use axon_log::SqliteEventLog;

    #[cfg(feature = "core")]
    pub use axon_provider::{LmMessage, LmResponse, Provider, ProviderError};

    #[cfg(feature = "core")]
    pub use axon_tool::{Tool, ToolError, ToolRegistry};

    #[cfg(feature = "governance")]
    pub use axon_governance::{
        BudgetManager, BudgetSpec, ConcurrencyLimiter, PermissionPolicy, PermissionsEngine,
        PolicyAction, StopChecker, StopLimits,
    };

    #[cfg(feature = "workflow")]
    pub use axon_workflow::{
        DagExecutor, DagWorkflow, TaskNode, TaskState, Workflow, WorkflowExecutor, task_fn,
    };

    #[cfg(feature = "sandbox")]
    pub use axon_sandbox::{Sandbox, host_fn};

    #[cfg(feature = "rlm")]
    pub use axon_rlm::{RecursiveExecutor, RlmConfig, RlmOutcome};

    #[cfg(feature = "agent")]
    pub use axon_agent::{AgentConfig, AgentOutcome, AgentRunner};

    #[cfg(feature = "replay")]
    pub use axon_replay::{ReplayEngine, ReplayMode};

    #[cfg(feature = "memory")]
    pub use axon_memory::{ContextPackBuilder, EpisodicStore, Fact, Provenance, SemanticStore};

    #[cfg(feature = "eval")]
    pub use axon_eval::{EvalCase, EvalRunner, EvalSuite};

    #[cfg(feature = "session")]
    pub use axon_session::{
        AgentSlotConfig, DomainRegistry, SessionConfig, SessionOrchestrator, SessionState,
    };
}
