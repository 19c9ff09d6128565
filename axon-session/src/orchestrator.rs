//! The session orchestrator — multi-agent session lifecycle on top of the
//! DAG engine.
//!
//! A session composes one agent run per configured slot into a linear DAG
//! executed by a background worker. The session owns its own run id:
//! `SessionStarted`/`SessionFinished` are emitted there, while the child
//! DAG gets a separate generated run id so the two sequence spaces never
//! collide. `SessionFinished` is emitted exactly once no matter how the
//! session ends.

use crate::config::SessionConfig;
use crate::registry::{DomainRegistry, RegistryError};
use axon0::event::{Event, EventKind};
use axon0::id::{RunId, SessionId};
use axon0::log::{EventLog, EventWriter, LogError};
use axon_agent::{AgentConfig, AgentRunner};
use axon_governance::budget::BudgetManager;
use axon_provider::Provider;
use axon_tool::ToolRegistry;
use axon_workflow::dag::{DagExecutor, DagWorkflow};
use axon_workflow::task::{TaskNode, task_fn};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Builds a provider for a model identifier.
pub type ProviderFactory = Arc<dyn Fn(&str) -> Arc<dyn Provider> + Send + Sync>;

/// Lifecycle states of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Validated, not yet started.
    Created,
    /// Worker running.
    Running,
    /// Worker finished normally.
    Succeeded,
    /// Worker failed.
    Failed,
    /// Stop was requested.
    Stopped,
}

impl SessionState {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Created => "CREATED",
            SessionState::Running => "RUNNING",
            SessionState::Succeeded => "SUCCEEDED",
            SessionState::Failed => "FAILED",
            SessionState::Stopped => "STOPPED",
        }
    }
}

/// Errors from session operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SessionError {
    /// Config referenced something the registry doesn't know.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The pack has no workflow with this name.
    #[error("unknown workflow '{workflow}' in pack '{pack}'")]
    UnknownWorkflow {
        /// The pack that was searched.
        pack: String,
        /// The missing workflow.
        workflow: String,
    },

    /// A session with this id already exists.
    #[error("session '{0}' already exists")]
    DuplicateSession(String),

    /// No session with this id.
    #[error("session '{0}' not found")]
    NotFound(String),

    /// The session is not in the state the operation requires.
    #[error("session '{session}' is in state {state}, expected {expected}")]
    InvalidState {
        /// The session.
        session: String,
        /// Its actual state.
        state: &'static str,
        /// The state the operation needed.
        expected: &'static str,
    },

    /// The session's DAG failed.
    #[error("session execution failed: {0}")]
    Execution(String),

    /// The event log failed.
    #[error(transparent)]
    Log(#[from] LogError),
}

/// Summary row for session listings.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    /// The session's id.
    pub session_id: SessionId,
    /// Current lifecycle state.
    pub state: SessionState,
    /// The session's domain pack.
    pub domain_pack: String,
    /// The session's workflow.
    pub workflow: String,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// Total configured agents.
    pub agent_count: u32,
    /// Failure cause, if the session failed.
    pub error: Option<String>,
}

struct SessionRecord {
    config: SessionConfig,
    state: SessionState,
    writer: EventWriter,
    created_at: DateTime<Utc>,
    stop_flag: Arc<AtomicBool>,
    finished_emitted: Arc<AtomicBool>,
    error: Option<String>,
}

/// Manages multi-agent sessions backed by DAG execution.
pub struct SessionOrchestrator {
    registry: Arc<DomainRegistry>,
    log: Arc<dyn EventLog>,
    provider_factory: ProviderFactory,
    sessions: Arc<Mutex<HashMap<String, SessionRecord>>>,
}

impl SessionOrchestrator {
    /// Create an orchestrator over a pack registry, an event log, and a
    /// provider factory.
    pub fn new(
        registry: Arc<DomainRegistry>,
        log: Arc<dyn EventLog>,
        provider_factory: ProviderFactory,
    ) -> Self {
        Self {
            registry,
            log,
            provider_factory,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Validate a config against the registry and register the session.
    pub fn create_session(&self, config: SessionConfig) -> Result<SessionId, SessionError> {
        let pack = self.registry.get_pack(&config.domain_pack)?;
        if pack.workflow(&config.workflow).is_none() {
            return Err(SessionError::UnknownWorkflow {
                pack: config.domain_pack.clone(),
                workflow: config.workflow.clone(),
            });
        }
        for slot in &config.agents {
            self.registry
                .get_role_template(&config.domain_pack, &slot.role)?;
        }

        let session_id = config.session_id.clone();
        let run_id = RunId::generate();
        let record = SessionRecord {
            writer: EventWriter::new(Arc::clone(&self.log), run_id),
            state: SessionState::Created,
            created_at: Utc::now(),
            stop_flag: Arc::new(AtomicBool::new(false)),
            finished_emitted: Arc::new(AtomicBool::new(false)),
            error: None,
            config,
        };

        let mut sessions = self.lock_sessions();
        if sessions.contains_key(session_id.as_str()) {
            return Err(SessionError::DuplicateSession(session_id.to_string()));
        }
        sessions.insert(session_id.to_string(), record);
        Ok(session_id)
    }

    /// Begin executing a session in a background worker.
    pub fn start_session(&self, session_id: &SessionId) -> Result<(), SessionError> {
        let (config, writer, stop_flag, finished_emitted) = {
            let mut sessions = self.lock_sessions();
            let record = sessions
                .get_mut(session_id.as_str())
                .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
            if record.state != SessionState::Created {
                return Err(SessionError::InvalidState {
                    session: session_id.to_string(),
                    state: record.state.as_str(),
                    expected: SessionState::Created.as_str(),
                });
            }
            record.state = SessionState::Running;
            (
                record.config.clone(),
                record.writer.clone(),
                Arc::clone(&record.stop_flag),
                Arc::clone(&record.finished_emitted),
            )
        };

        let registry = Arc::clone(&self.registry);
        let log = Arc::clone(&self.log);
        let provider_factory = Arc::clone(&self.provider_factory);
        let sessions = Arc::clone(&self.sessions);
        let session_key = session_id.to_string();

        tokio::spawn(async move {
            let outcome = execute_session(
                &config,
                &registry,
                log,
                provider_factory,
                &writer,
                &stop_flag,
            )
            .await;

            let mut sessions = sessions
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let Some(record) = sessions.get_mut(&session_key) else {
                return;
            };
            match outcome {
                Ok(()) => {
                    if record.state == SessionState::Running {
                        record.state = SessionState::Succeeded;
                    }
                    emit_session_finished(
                        &writer,
                        &finished_emitted,
                        &config,
                        "SUCCEEDED",
                        None,
                    );
                }
                Err(error) => {
                    tracing::error!(session = %session_key, %error, "session worker failed");
                    let message = error.to_string();
                    record.state = SessionState::Failed;
                    record.error = Some(message.clone());
                    emit_session_finished(
                        &writer,
                        &finished_emitted,
                        &config,
                        "FAILED",
                        Some(message),
                    );
                }
            }
        });

        Ok(())
    }

    /// Request a graceful stop. The DAG worker observes the flag between
    /// task submissions; in-flight agents finish.
    pub fn stop_session(&self, session_id: &SessionId) -> Result<(), SessionError> {
        let mut sessions = self.lock_sessions();
        let record = sessions
            .get_mut(session_id.as_str())
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        if record.state == SessionState::Running {
            record.stop_flag.store(true, Ordering::SeqCst);
            record.state = SessionState::Stopped;
            emit_session_finished(
                &record.writer,
                &record.finished_emitted,
                &record.config,
                "STOPPED",
                None,
            );
        }
        Ok(())
    }

    /// A session's current state.
    pub fn get_session_state(&self, session_id: &SessionId) -> Result<SessionState, SessionError> {
        let sessions = self.lock_sessions();
        sessions
            .get(session_id.as_str())
            .map(|record| record.state)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    /// Events for the session's own run, optionally from a sequence
    /// number onward.
    pub fn get_session_events(
        &self,
        session_id: &SessionId,
        after_seq: u64,
    ) -> Result<Vec<Event>, SessionError> {
        let run_id = {
            let sessions = self.lock_sessions();
            sessions
                .get(session_id.as_str())
                .map(|record| record.writer.run_id().clone())
                .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?
        };
        let events = self.log.replay(&run_id)?;
        Ok(events.into_iter().filter(|e| e.seq >= after_seq).collect())
    }

    /// Summaries of all sessions, sorted by id.
    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        let sessions = self.lock_sessions();
        let mut summaries: Vec<SessionSummary> = sessions
            .values()
            .map(|record| SessionSummary {
                session_id: record.config.session_id.clone(),
                state: record.state,
                domain_pack: record.config.domain_pack.clone(),
                workflow: record.config.workflow.clone(),
                created_at: record.created_at,
                agent_count: record.config.agent_count(),
                error: record.error.clone(),
            })
            .collect();
        summaries.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        summaries
    }

    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, HashMap<String, SessionRecord>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Emit `SessionFinished` exactly once per session.
fn emit_session_finished(
    writer: &EventWriter,
    finished_emitted: &Arc<AtomicBool>,
    config: &SessionConfig,
    outcome: &str,
    error: Option<String>,
) {
    if finished_emitted.swap(true, Ordering::SeqCst) {
        return;
    }
    let emitted = writer.emit(
        EventKind::SessionFinished,
        json!({
            "session_id": &config.session_id,
            "outcome": outcome,
            "error": &error,
        }),
    );
    if let Err(error) = emitted {
        tracing::error!(%error, "failed to emit SessionFinished");
    }
}

/// The background worker body: emit `SessionStarted`, build the agent
/// DAG, run it.
async fn execute_session(
    config: &SessionConfig,
    registry: &Arc<DomainRegistry>,
    log: Arc<dyn EventLog>,
    provider_factory: ProviderFactory,
    writer: &EventWriter,
    stop_flag: &Arc<AtomicBool>,
) -> Result<(), SessionError> {
    writer.emit(
        EventKind::SessionStarted,
        json!({
            "session_id": &config.session_id,
            "domain_pack": &config.domain_pack,
            "workflow": &config.workflow,
            "agent_count": config.agent_count(),
        }),
    )?;

    let pack = registry.get_pack(&config.domain_pack)?;

    // One task per agent instance, chained linearly in slot order.
    let mut dag = DagWorkflow::new(format!("session-{}", config.session_id));
    let mut previous: Option<axon0::id::TaskId> = None;

    for slot in &config.agents {
        let role = registry.get_role_template(&config.domain_pack, &slot.role)?;
        for instance in 0..slot.count.max(1) {
            let tool_entries: Vec<_> = role
                .tool_names
                .iter()
                .filter_map(|name| pack.tool(name).cloned())
                .collect();
            let system_prompt = slot
                .system_prompt_override
                .clone()
                .unwrap_or_else(|| role.system_prompt.clone());
            let task_description = slot
                .system_prompt_override
                .clone()
                .unwrap_or_else(|| role.description.clone());
            let budget_spec = slot
                .budget_override
                .clone()
                .unwrap_or_else(|| role.budget_profile.clone());
            let max_steps = role.max_steps;
            let provider = provider_factory(&slot.model);
            let log = Arc::clone(&log);
            let stop_flag = Arc::clone(stop_flag);

            let body = task_fn(move || {
                let tool_entries = tool_entries.clone();
                let system_prompt = system_prompt.clone();
                let task_description = task_description.clone();
                let budget_spec = budget_spec.clone();
                let provider = Arc::clone(&provider);
                let log = Arc::clone(&log);
                let stop_flag = Arc::clone(&stop_flag);
                async move {
                    if stop_flag.load(Ordering::SeqCst) {
                        return Ok(json!({"skipped": true}));
                    }

                    let mut tools = ToolRegistry::new();
                    for entry in &tool_entries {
                        tools.register(entry.build());
                    }

                    let agent_run_id = RunId::generate();
                    let agent_writer = EventWriter::new(Arc::clone(&log), agent_run_id.clone());
                    let budget = Arc::new(Mutex::new(BudgetManager::new(
                        budget_spec,
                        agent_writer.clone(),
                    )));

                    let report = AgentRunner::new(agent_writer, provider, Arc::new(tools))
                        .with_budget(budget)
                        .run(
                            &task_description,
                            AgentConfig {
                                system_prompt,
                                max_steps,
                                ..AgentConfig::default()
                            },
                        )
                        .await
                        .map_err(|e| axon_workflow::task::TaskError(e.to_string()))?;

                    Ok(json!({
                        "run_id": &agent_run_id,
                        "outcome": report.outcome.as_str(),
                        "result": &report.result,
                    }))
                }
            });

            let mut task = TaskNode::new(
                format!("{} #{} ({})", role.display_name, instance + 1, slot.model),
                body,
            );
            if let Some(previous) = &previous {
                task = task.with_dependencies(vec![previous.clone()]);
            }
            previous = Some(task.id.clone());
            dag.add_task(task);
        }
    }

    // The DAG gets its own run id so its sequence space cannot collide
    // with the session's events.
    let executor = DagExecutor::new(Arc::clone(&log), config.max_parallel.max(1))
        .with_stop_flag(Arc::clone(stop_flag));
    executor
        .run(&mut dag, None)
        .await
        .map_err(|e| SessionError::Execution(e.to_string()))
        .map(|_| ())
}
