#![deny(missing_docs)]
//! Recursive LM executor — the RLM loop.
//!
//! Each iteration asks the model for a script, executes it in the
//! persistent sandbox, and feeds the resulting state back as a metadata
//! block. Assignment to `FINAL` ends the run. An `lm_query` host function
//! lets scripts make nested sub-queries, with recursion depth accounted
//! through the budget.
//!
//! Every step is events-first: budget and stop checks, LM calls, and
//! sandbox executions each emit before and after, so a run can be fully
//! reconstructed from its log.

use axon0::event::EventKind;
use axon0::hash::short_hash;
use axon0::id::RunId;
use axon0::log::{EventWriter, LogError};
use axon_governance::budget::{BudgetDelta, BudgetError, BudgetManager};
use axon_governance::stop::StopChecker;
use axon_provider::{LmMessage, Provider};
use axon_sandbox::{ExecResult, HostFn, Sandbox, host_fn};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Configuration for a recursive LM run.
#[derive(Debug, Clone)]
pub struct RlmConfig {
    /// System prompt describing the sandbox to the model.
    pub system_prompt: String,
    /// Maximum sandbox iterations before giving up.
    pub max_iterations: u32,
    /// Max characters of stdout echoed into the message history.
    pub max_stdout_in_history: usize,
    /// Max depth of nested `lm_query` calls.
    pub max_recursion_depth: i64,
}

impl Default for RlmConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_iterations: 100,
            max_stdout_in_history: 500,
            max_recursion_depth: 1,
        }
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a recursive language model agent with a persistent script sandbox.
The user's prompt is stored in the variable P.
Respond with ONLY sandbox code, no prose and no code fences.

The sandbox language: one statement per line; `x = expr` assignment;
`if cond { ... } else { ... }`; `for item in list { ... }`; literals for
numbers, strings, lists and maps; operators + - * / % == != < <= > >= and
or not; indexing xs[0] and m[\"key\"]. Builtins: abs, len, min, max, sum,
round, str, num, upper, lower, split, join, contains, range, sorted,
reversed, keys, values, append, get, print.

Call lm_query(text) to ask a sub-query of the language model.
When you are done, assign your final answer to the variable FINAL.";

/// Why an RLM run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RlmOutcome {
    /// `FINAL` was assigned.
    Succeeded,
    /// The iteration limit ran out.
    MaxIterations,
    /// A stop condition fired.
    Stopped,
    /// A budget limit was hit.
    BudgetExceeded,
    /// An unexpected failure (e.g. provider error).
    Failed,
}

impl RlmOutcome {
    /// Wire name, as recorded in `RunFinished.payload.outcome`.
    pub fn as_str(&self) -> &'static str {
        match self {
            RlmOutcome::Succeeded => "SUCCEEDED",
            RlmOutcome::MaxIterations => "MAX_ITERATIONS",
            RlmOutcome::Stopped => "STOPPED",
            RlmOutcome::BudgetExceeded => "BUDGET_EXCEEDED",
            RlmOutcome::Failed => "FAILED",
        }
    }
}

/// What a finished RLM run reports to its caller. The event log carries
/// the full detail; this is the in-process summary.
#[derive(Debug, Clone)]
pub struct RlmReport {
    /// The run's id.
    pub run_id: RunId,
    /// How the run ended.
    pub outcome: RlmOutcome,
    /// The value of `FINAL`, when the run succeeded.
    pub result: Option<String>,
    /// Iterations actually executed.
    pub iterations: u32,
}

/// Executes the RLM algorithm: the model writes scripts, the sandbox runs
/// them, state snapshots flow back, repeat until `FINAL`.
pub struct RecursiveExecutor {
    writer: EventWriter,
    provider: Arc<dyn Provider>,
    budget: Option<Arc<Mutex<BudgetManager>>>,
    stop: Option<StopChecker>,
    extra_vars: Vec<(String, Value)>,
    extra_host_fns: Vec<(String, Arc<dyn HostFn>)>,
}

impl RecursiveExecutor {
    /// Create an executor for one run. The writer fixes the run id.
    pub fn new(writer: EventWriter, provider: Arc<dyn Provider>) -> Self {
        Self {
            writer,
            provider,
            budget: None,
            stop: None,
            extra_vars: Vec::new(),
            extra_host_fns: Vec::new(),
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

    /// Seed an extra sandbox variable.
    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.extra_vars.push((name.into(), value));
        self
    }

    /// Register an extra sandbox host function.
    pub fn with_host_fn(mut self, name: impl Into<String>, f: Arc<dyn HostFn>) -> Self {
        self.extra_host_fns.push((name.into(), f));
        self
    }

    /// Run the loop on a prompt. Returns the run report; only event-log
    /// failures are errors.
    pub async fn run(mut self, prompt: &str, config: RlmConfig) -> Result<RlmReport, LogError> {
        let run_id = self.writer.run_id().clone();
        self.writer.emit(
            EventKind::RunStarted,
            json!({
                "executor": "RecursiveExecutor",
                "prompt_length": prompt.len(),
            }),
        )?;

        let mut sandbox = Sandbox::new()
            .with_variable("P", Value::String(prompt.to_string()))
            .with_host_fn("lm_query", self.build_lm_query(&config));
        for (name, value) in self.extra_vars.drain(..) {
            sandbox.set_variable(name, value);
        }
        let host_fns = std::mem::take(&mut self.extra_host_fns);
        for (name, f) in host_fns {
            sandbox = sandbox.with_host_fn(name, f);
        }

        let mut history = vec![
            LmMessage::system(config.system_prompt.clone()),
            LmMessage::user(format!("Process the following prompt:\n\n{prompt}")),
        ];

        let mut outcome = RlmOutcome::MaxIterations;
        let mut final_result: Option<String> = None;
        let mut failure: Option<String> = None;
        let mut iterations = 0;

        for iteration in 1..=config.max_iterations {
            iterations = iteration;

            // 1. Budget.
            if let Some(budget) = &self.budget {
                let checked = budget
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .check();
                match checked {
                    Ok(()) => {}
                    Err(BudgetError::Exceeded { .. }) => {
                        outcome = RlmOutcome::BudgetExceeded;
                        break;
                    }
                    Err(BudgetError::Log(e)) => return Err(e),
                    Err(_) => unreachable!("BudgetError is non_exhaustive with no other variants"),
                }
            }

            // 2. Stop conditions.
            if let Some(stop) = &mut self.stop {
                if stop.check()?.is_some() {
                    outcome = RlmOutcome::Stopped;
                    break;
                }
            }

            // 3. Iteration begins.
            self.writer.emit(
                EventKind::RLMIterationStarted,
                json!({"iteration": iteration}),
            )?;

            // 4. Code generation.
            self.writer.emit(
                EventKind::LMCallStarted,
                json!({
                    "call_type": "code_generation",
                    "iteration": iteration,
                    "history_length": history.len(),
                }),
            )?;
            let lm_start = Instant::now();
            let response = match self.provider.complete(&history).await {
                Ok(response) => response,
                Err(error) => {
                    tracing::error!(%error, "code-generation call failed");
                    outcome = RlmOutcome::Failed;
                    failure = Some(error.to_string());
                    break;
                }
            };
            let code = response.content.clone();
            let code_hash = short_hash(&Value::String(code.clone()));
            self.writer.emit(
                EventKind::LMCallFinished,
                json!({
                    "call_type": "code_generation",
                    "code_hash": &code_hash,
                    "code_length": code.len(),
                    "tokens_used": response.tokens_used,
                    "duration_s": lm_start.elapsed().as_secs_f64(),
                }),
            )?;

            // 5. Tokens into the budget.
            if let Some(budget) = &self.budget {
                budget
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .record_tokens(response.tokens_used)?;
            }

            // 6. Sandbox execution.
            self.writer.emit(
                EventKind::REPLExecStarted,
                json!({"code_hash": &code_hash, "iteration": iteration}),
            )?;
            let exec = sandbox.execute(&code).await;
            self.writer.emit(
                EventKind::REPLExecFinished,
                json!({
                    "success": exec.success,
                    "stdout_length": exec.stdout.len(),
                    "has_final": exec.state.has_final,
                    "variables": exec.state.variables.keys().collect::<Vec<_>>(),
                    "error_type": &exec.error_type,
                    "error_message": &exec.error_message,
                }),
            )?;

            if let Some(stop) = &mut self.stop {
                if exec.success {
                    stop.record_success();
                } else {
                    stop.record_failure();
                }
            }

            // 7. Feed code + sandbox state back to the model.
            history.push(LmMessage::assistant(code.clone()));
            history.push(LmMessage::user(format_metadata(
                iteration,
                &exec,
                config.max_stdout_in_history,
            )));

            // 8. Iteration ends.
            self.writer.emit(
                EventKind::RLMIterationFinished,
                json!({
                    "iteration": iteration,
                    "has_final": exec.state.has_final,
                    "success": exec.success,
                }),
            )?;

            // 9. FINAL terminates the loop.
            if exec.state.has_final {
                outcome = RlmOutcome::Succeeded;
                final_result = exec.state.final_value.clone();
                break;
            }
        }

        let mut payload = json!({
            "executor": "RecursiveExecutor",
            "outcome": outcome.as_str(),
            "final_result": &final_result,
        });
        if let Some(error) = failure {
            payload["error"] = Value::String(error);
        }
        self.writer.emit(EventKind::RunFinished, payload)?;

        Ok(RlmReport {
            run_id,
            outcome,
            result: final_result,
            iterations,
        })
    }

    /// The `lm_query` host function: a nested, budget-accounted provider
    /// call. Depth overflow and provider failures surface as sandbox
    /// errors and flow back to the model, never up to the kernel.
    fn build_lm_query(&self, config: &RlmConfig) -> Arc<dyn HostFn> {
        let writer = self.writer.clone();
        let provider = Arc::clone(&self.provider);
        let budget = self.budget.clone();
        let max_depth = config.max_recursion_depth;
        let depth = Arc::new(Mutex::new(0i64));

        host_fn(move |args: Vec<Value>| {
            let writer = writer.clone();
            let provider = Arc::clone(&provider);
            let budget = budget.clone();
            let depth = Arc::clone(&depth);
            async move {
                let Some(Value::String(query)) = args.into_iter().next() else {
                    return Err("lm_query() requires a string argument".to_string());
                };

                {
                    let mut depth = depth.lock().unwrap_or_else(|p| p.into_inner());
                    if *depth >= max_depth {
                        return Err(format!("Max recursion depth ({max_depth}) exceeded"));
                    }
                    *depth += 1;
                }
                if let Some(inner_budget) = &budget {
                    let applied = inner_budget
                        .lock()
                        .unwrap_or_else(|p| p.into_inner())
                        .apply(BudgetDelta::recursion(1));
                    if let Err(e) = applied {
                        release_depth(&depth, &budget);
                        return Err(e.to_string());
                    }
                }

                let result = sub_query(&writer, &provider, &budget, &query).await;
                release_depth(&depth, &budget);
                result
            }
        })
    }
}

/// The body of one sub-query, separated so the depth bookkeeping around it
/// stays in one place.
async fn sub_query(
    writer: &EventWriter,
    provider: &Arc<dyn Provider>,
    budget: &Option<Arc<Mutex<BudgetManager>>>,
    query: &str,
) -> Result<Value, String> {
    writer
        .emit(
            EventKind::LMCallStarted,
            json!({"call_type": "sub_lm_query", "query_length": query.len()}),
        )
        .map_err(|e| e.to_string())?;
    let start = Instant::now();
    let response = provider
        .complete(&[LmMessage::user(query)])
        .await
        .map_err(|e| e.to_string())?;
    writer
        .emit(
            EventKind::LMCallFinished,
            json!({
                "call_type": "sub_lm_query",
                "tokens_used": response.tokens_used,
                "duration_s": start.elapsed().as_secs_f64(),
            }),
        )
        .map_err(|e| e.to_string())?;
    if let Some(budget) = budget {
        budget
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .record_tokens(response.tokens_used)
            .map_err(|e| e.to_string())?;
    }
    Ok(Value::String(response.content))
}

fn release_depth(depth: &Arc<Mutex<i64>>, budget: &Option<Arc<Mutex<BudgetManager>>>) {
    *depth.lock().unwrap_or_else(|p| p.into_inner()) -= 1;
    if let Some(budget) = budget {
        // A failed emit here has no caller to report to; the next budget
        // operation will surface the log failure.
        let _ = budget
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .apply(BudgetDelta::recursion(-1));
    }
}

/// The metadata block appended to history after each sandbox execution.
fn format_metadata(iteration: u32, exec: &ExecResult, max_stdout: usize) -> String {
    let mut lines = vec![format!("[SANDBOX] iteration={iteration}")];
    lines.push(format!(
        "  variables: [{}]",
        exec.state
            .variables
            .keys()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    ));
    if !exec.stdout.is_empty() {
        let truncated: String = exec.stdout.chars().take(max_stdout).collect();
        lines.push(format!(
            "  stdout ({} chars): {truncated}",
            exec.stdout.len()
        ));
    }
    if !exec.success {
        lines.push(format!(
            "  error: {}: {}",
            exec.error_type.as_deref().unwrap_or("Error"),
            exec.error_message.as_deref().unwrap_or("")
        ));
    }
    if exec.state.has_final {
        lines.push(format!(
            "  FINAL is set: {}",
            exec.state.final_value.as_deref().unwrap_or("")
        ));
    }
    lines.join("\n")
}
