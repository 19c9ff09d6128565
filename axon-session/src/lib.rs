#![deny(missing_docs)]
//! Multi-agent session orchestration for axon.
//!
//! A session composes agents declared by a domain pack into a DAG run by
//! a background worker. The [`registry::DomainRegistry`] validates every
//! configuration before a session exists; the
//! [`orchestrator::SessionOrchestrator`] owns lifecycle, cancellation,
//! and the session's own event stream.

pub mod config;
pub mod orchestrator;
pub mod registry;

pub use config::{AgentSlotConfig, SessionConfig};
pub use orchestrator::{
    ProviderFactory, SessionError, SessionOrchestrator, SessionState, SessionSummary,
};
pub use registry::{
    DomainPackManifest, DomainRegistry, RegistryError, RoleTemplate, ToolFactory,
    ToolManifestEntry, WorkflowManifestEntry,
};
