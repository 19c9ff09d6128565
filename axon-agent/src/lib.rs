#![deny(missing_docs)]
//! Tool-calling agent executor.
//!
//! Drives an LLM through a registry of named tools with the full
//! governance stack in the loop: budget check, stop check, model call,
//! action parse, permission check, schema validation, tool execution —
//! each leg recorded in the event log before the next begins.
//!
//! Tool failures, permission denials, unknown tools, and parse errors are
//! feedback to the model, not run-fatal errors; only event-log failures
//! abort a run.

use axon0::event::EventKind;
use axon0::hash::hash_value;
use axon0::id::RunId;
use axon0::log::{EventWriter, LogError};
use axon_governance::budget::{BudgetError, BudgetManager};
use axon_governance::permissions::{PermissionError, PermissionsEngine};
use axon_governance::stop::StopChecker;
use axon_provider::{LmMessage, Provider};
use axon_tool::{ToolRegistry, schema};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Instant;

pub mod acceptance;
pub mod action;
pub mod config;
pub mod context;
pub mod descriptions;

pub use acceptance::{AcceptanceChecker, AcceptanceCriterion, CriterionResult, criterion};
pub use action::{ActionParseError, AgentAction, parse_agent_action};
pub use config::{ACTION_FORMAT, AgentConfig};

/// Max characters of a tool result echoed into history.
const TOOL_RESULT_BUDGET: usize = 2000;

/// Why an agent run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentOutcome {
    /// The model finished (and passed acceptance, if configured).
    Succeeded,
    /// The step limit ran out.
    MaxSteps,
    /// A budget limit was hit.
    BudgetExceeded,
    /// A stop condition fired.
    Stopped,
    /// Too many consecutive unparseable responses.
    TooManyErrors,
    /// An unexpected failure (e.g. provider error).
    Failed,
}

impl AgentOutcome {
    /// Wire name, as recorded in `RunFinished.payload.outcome`.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentOutcome::Succeeded => "SUCCEEDED",
            AgentOutcome::MaxSteps => "MAX_STEPS",
            AgentOutcome::BudgetExceeded => "BUDGET_EXCEEDED",
            AgentOutcome::Stopped => "STOPPED",
            AgentOutcome::TooManyErrors => "TOO_MANY_ERRORS",
            AgentOutcome::Failed => "FAILED",
        }
    }
}

/// Summary a finished agent run hands back to its caller.
#[derive(Debug, Clone)]
pub struct AgentReport {
    /// The run's id.
    pub run_id: RunId,
    /// How the run ended.
    pub outcome: AgentOutcome,
    /// The finish result, when the run succeeded.
    pub result: Option<String>,
    /// Steps actually executed.
    pub steps: u32,
}

/// What one step produced, recorded as `AgentStepFinished.result_label`.
enum StepResult {
    Finish,
    ToolSuccess,
    ToolError,
    ParseError,
    UnknownTool,
    PermissionDenied,
    ValidationError,
    AcceptanceFailed,
}

impl StepResult {
    fn as_str(&self) -> &'static str {
        match self {
            StepResult::Finish => "finish",
            StepResult::ToolSuccess => "tool_success",
            StepResult::ToolError => "tool_error",
            StepResult::ParseError => "parse_error",
            StepResult::UnknownTool => "unknown_tool",
            StepResult::PermissionDenied => "permission_denied",
            StepResult::ValidationError => "validation_error",
            StepResult::AcceptanceFailed => "acceptance_failed",
        }
    }
}

/// Executes the observe-plan-act-verify loop over a tool registry.
pub struct AgentRunner {
    writer: EventWriter,
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    budget: Option<Arc<Mutex<BudgetManager>>>,
    stop: Option<StopChecker>,
    permissions: Option<PermissionsEngine>,
    acceptance: Option<AcceptanceChecker>,
}

impl AgentRunner {
    /// Create a runner for one run. The writer fixes the run id.
    pub fn new(writer: EventWriter, provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            writer,
            provider,
            tools,
            budget: None,
            stop: None,
            permissions: None,
            acceptance: None,
        }
    }

    /// Enforce a budget. The manager must share this run's event writer.
    pub fn with_budget(mut self, budget: Arc<Mutex<BudgetManager>>) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Enable stop-condition checking.
    pub fn with_stop_checker(mut self, stop: StopChecker) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Enforce a permission policy on tool calls.
    pub fn with_permissions(mut self, permissions: PermissionsEngine) -> Self {
        self.permissions = Some(permissions);
        self
    }

    /// Gate `finish` actions on acceptance criteria.
    pub fn with_acceptance(mut self, acceptance: AcceptanceChecker) -> Self {
        self.acceptance = Some(acceptance);
        self
    }

    /// Run the agent loop on a task description. Returns the run report;
    /// only event-log failures are errors.
    pub async fn run(mut self, task: &str, config: AgentConfig) -> Result<AgentReport, LogError> {
        let run_id = self.writer.run_id().clone();
        self.writer.emit(
            EventKind::RunStarted,
            json!({"executor": "AgentRunner", "task_length": task.len()}),
        )?;

        let descriptions =
            descriptions::build_tool_descriptions(&self.tools, config.include_tool_schemas);
        let system = format!(
            "{}{}\n\n# Available Tools\n\n{}",
            ACTION_FORMAT, config.system_prompt, descriptions
        );
        let mut history = vec![LmMessage::system(system), LmMessage::user(task)];

        let mut outcome = AgentOutcome::MaxSteps;
        let mut final_result: Option<String> = None;
        let mut failure: Option<String> = None;
        let mut consecutive_errors = 0u32;
        let mut steps = 0;

        'steps: for step in 1..=config.max_steps {
            steps = step;

            if let Some(budget) = &self.budget {
                let checked = budget
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .check();
                match checked {
                    Ok(()) => {}
                    Err(BudgetError::Exceeded { .. }) => {
                        outcome = AgentOutcome::BudgetExceeded;
                        break;
                    }
                    Err(BudgetError::Log(e)) => return Err(e),
                    Err(_) => unreachable!("BudgetError is non_exhaustive with no other variants"),
                }
            }

            if let Some(stop) = &mut self.stop {
                if stop.check()?.is_some() {
                    outcome = AgentOutcome::Stopped;
                    break;
                }
            }

            self.writer
                .emit(EventKind::AgentStepStarted, json!({"step": step}))?;

            self.writer.emit(
                EventKind::LMCallStarted,
                json!({
                    "call_type": "agent_step",
                    "step": step,
                    "history_length": history.len(),
                }),
            )?;
            let lm_start = Instant::now();
            let response = match self.provider.complete(&history).await {
                Ok(response) => response,
                Err(error) => {
                    tracing::error!(%error, "agent step call failed");
                    outcome = AgentOutcome::Failed;
                    failure = Some(error.to_string());
                    break;
                }
            };
            self.writer.emit(
                EventKind::LMCallFinished,
                json!({
                    "call_type": "agent_step",
                    "tokens_used": response.tokens_used,
                    "duration_s": lm_start.elapsed().as_secs_f64(),
                }),
            )?;
            if let Some(budget) = &self.budget {
                budget
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .record_tokens(response.tokens_used)?;
            }

            let action = match parse_agent_action(&response.content) {
                Ok(action) => action,
                Err(error) => {
                    consecutive_errors += 1;
                    tracing::debug!(step, %error, "unparseable agent response");
                    history.push(LmMessage::assistant(response.content.clone()));
                    history.push(LmMessage::user(format!(
                        "[ERROR] Failed to parse your response as JSON: {error}\n\
                         Please respond with a valid JSON object."
                    )));
                    self.finish_step(step, StepResult::ParseError)?;
                    if consecutive_errors >= config.max_consecutive_errors {
                        outcome = AgentOutcome::TooManyErrors;
                        break;
                    }
                    continue;
                }
            };
            consecutive_errors = 0;

            match action {
                AgentAction::Finish { result, .. } => {
                    if let Some(acceptance) = &self.acceptance {
                        let (all_passed, results) = acceptance.check_all(&result, &run_id);
                        if !all_passed {
                            let feedback = results
                                .iter()
                                .filter(|r| !r.passed)
                                .map(|r| format!("- {}: {}", r.name, r.message))
                                .collect::<Vec<_>>()
                                .join("\n");
                            history.push(LmMessage::assistant(response.content.clone()));
                            history.push(LmMessage::user(format!(
                                "Acceptance criteria not met:\n{feedback}"
                            )));
                            self.finish_step(step, StepResult::AcceptanceFailed)?;
                            continue 'steps;
                        }
                    }
                    outcome = AgentOutcome::Succeeded;
                    final_result = Some(result);
                    self.finish_step(step, StepResult::Finish)?;
                    break;
                }
                AgentAction::ToolCall { tool, input, .. } => {
                    let result = self
                        .execute_tool_call(&tool, input, &mut history, &response.content)
                        .await?;
                    self.finish_step(step, result)?;
                }
            }
        }

        let mut payload = json!({
            "executor": "AgentRunner",
            "outcome": outcome.as_str(),
            "final_result": &final_result,
        });
        if let Some(error) = failure {
            payload["error"] = Value::String(error);
        }
        self.writer.emit(EventKind::RunFinished, payload)?;

        Ok(AgentReport {
            run_id,
            outcome,
            result: final_result,
            steps,
        })
    }

    fn finish_step(&self, step: u32, result: StepResult) -> Result<(), LogError> {
        self.writer.emit(
            EventKind::AgentStepFinished,
            json!({"step": step, "result_label": result.as_str()}),
        )?;
        Ok(())
    }

    /// One governed tool dispatch. Returns the step's result label; only
    /// log failures propagate.
    async fn execute_tool_call(
        &mut self,
        tool_name: &str,
        input: Value,
        history: &mut Vec<LmMessage>,
        raw_response: &str,
    ) -> Result<StepResult, LogError> {
        let input_hash = hash_value(&input);

        let Some(tool) = self.tools.get(tool_name).map(Arc::clone) else {
            history.push(LmMessage::assistant(raw_response));
            history.push(LmMessage::user(format!(
                "[ERROR] Unknown tool '{tool_name}'. Available tools: {}",
                self.tools.names().join(", ")
            )));
            return Ok(StepResult::UnknownTool);
        };

        if let Some(permissions) = &self.permissions {
            match permissions.check(tool_name, tool.side_effect()) {
                Ok(()) => {}
                Err(PermissionError::Denied { reason, .. }) => {
                    history.push(LmMessage::assistant(raw_response));
                    history.push(LmMessage::user(format!(
                        "[ERROR] Permission denied: {reason}"
                    )));
                    return Ok(StepResult::PermissionDenied);
                }
                Err(PermissionError::Log(e)) => return Err(e),
                Err(_) => unreachable!("PermissionError is non_exhaustive with no other variants"),
            }
        }

        if let Some(budget) = &self.budget {
            budget
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .record_tool_call()?;
        }
        if let Some(stop) = &mut self.stop {
            stop.record_tool_call(tool_name, &input_hash);
        }

        let report = schema::validate(&input, &tool.input_schema());
        if !report.valid {
            history.push(LmMessage::assistant(raw_response));
            history.push(LmMessage::user(format!(
                "[ERROR] Invalid input for tool '{tool_name}': {}",
                report.errors.join("; ")
            )));
            return Ok(StepResult::ValidationError);
        }

        self.writer.emit(
            EventKind::ToolCallStarted,
            json!({
                "tool_name": tool_name,
                "side_effect": tool.side_effect().as_str(),
                "input_hash": &input_hash,
                "input": &input,
            }),
        )?;

        let execution = tool.call(input).await.and_then(|output| {
            let report = schema::validate(&output, &tool.output_schema());
            if report.valid {
                Ok(output)
            } else {
                Err(axon_tool::ToolError::InvalidOutput(
                    report.errors.join("; "),
                ))
            }
        });

        match execution {
            Ok(output) => {
                self.writer.emit(
                    EventKind::ToolCallFinished,
                    json!({
                        "tool_name": tool_name,
                        "success": true,
                        "output_hash": hash_value(&output),
                        "output": &output,
                    }),
                )?;
                if let Some(stop) = &mut self.stop {
                    stop.record_success();
                }
                let rendered =
                    serde_json::to_string_pretty(&output).unwrap_or_else(|_| output.to_string());
                history.push(LmMessage::assistant(raw_response));
                history.push(LmMessage::user(format!(
                    "[TOOL RESULT] {tool_name}:\n{}",
                    context::compress_for_context(&rendered, TOOL_RESULT_BUDGET)
                )));
                Ok(StepResult::ToolSuccess)
            }
            Err(error) => {
                self.writer.emit(
                    EventKind::ToolCallFinished,
                    json!({
                        "tool_name": tool_name,
                        "success": false,
                        "error": error.to_string(),
                    }),
                )?;
                if let Some(stop) = &mut self.stop {
                    stop.record_failure();
                }
                history.push(LmMessage::assistant(raw_response));
                history.push(LmMessage::user(format!(
                    "[ERROR] Tool '{tool_name}' failed: {error}"
                )));
                Ok(StepResult::ToolError)
            }
        }
    }
}
