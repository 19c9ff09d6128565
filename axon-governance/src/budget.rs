//! Budget tracking and enforcement.
//!
//! A [`BudgetManager`] owns a spec (the ceilings) and a usage record, and
//! emits `BudgetUpdated` on every applied delta. `check()` is called by
//! executors before each unit of work; the first exceeded limit — in the
//! fixed order tokens, tool calls, time, recursion depth, parallelism —
//! emits `BudgetExceeded` and surfaces as [`BudgetError::Exceeded`].
//!
//! Time is check-point measured: `check()` samples the wall clock, so a
//! single long call is only caught at the next check, never interrupted.

use axon0::event::EventKind;
use axon0::log::{EventWriter, LogError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Instant;
use thiserror::Error;

/// Resource ceilings for one run. Every field must be positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetSpec {
    /// Maximum total LM tokens.
    pub max_tokens: u64,
    /// Maximum tool invocations.
    pub max_tool_calls: u64,
    /// Maximum elapsed wall-clock seconds, sampled at check points.
    pub max_time_s: f64,
    /// Maximum nested sub-query depth.
    pub max_recursion_depth: i64,
    /// Maximum concurrent workers.
    pub max_parallel: i64,
}

impl Default for BudgetSpec {
    fn default() -> Self {
        Self {
            max_tokens: 100_000,
            max_tool_calls: 100,
            max_time_s: 600.0,
            max_recursion_depth: 2,
            max_parallel: 4,
        }
    }
}

/// Accumulated usage. Token/call/time fields only grow; depth and
/// parallelism are signed-delta tracked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BudgetUsage {
    /// LM tokens consumed so far.
    pub tokens_used: u64,
    /// Tool invocations so far.
    pub tool_calls_used: u64,
    /// Elapsed wall-clock seconds as of the last check or applied delta.
    pub time_elapsed_s: f64,
    /// Current nested sub-query depth.
    pub current_recursion_depth: i64,
    /// Current concurrent workers.
    pub current_parallel: i64,
}

impl BudgetUsage {
    /// Name of the first exceeded limit, in the canonical check order.
    pub fn exceeds(&self, spec: &BudgetSpec) -> Option<&'static str> {
        if self.tokens_used >= spec.max_tokens {
            Some("max_tokens")
        } else if self.tool_calls_used >= spec.max_tool_calls {
            Some("max_tool_calls")
        } else if self.time_elapsed_s >= spec.max_time_s {
            Some("max_time_s")
        } else if self.current_recursion_depth >= spec.max_recursion_depth {
            Some("max_recursion_depth")
        } else if self.current_parallel >= spec.max_parallel {
            Some("max_parallel")
        } else {
            None
        }
    }
}

/// A usage change. Negative values are only expressible for recursion
/// depth and parallelism — the other fields are unsigned by construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BudgetDelta {
    /// Tokens to add.
    pub tokens: u64,
    /// Tool calls to add.
    pub tool_calls: u64,
    /// Seconds to add.
    pub time_s: f64,
    /// Signed recursion-depth change.
    pub recursion_depth_change: i64,
    /// Signed parallelism change.
    pub parallel_change: i64,
}

impl BudgetDelta {
    /// A delta recording `n` tokens.
    pub fn tokens(n: u64) -> Self {
        Self {
            tokens: n,
            ..Self::default()
        }
    }

    /// A delta recording one tool call.
    pub fn tool_call() -> Self {
        Self {
            tool_calls: 1,
            ..Self::default()
        }
    }

    /// A delta changing recursion depth by `change`.
    pub fn recursion(change: i64) -> Self {
        Self {
            recursion_depth_change: change,
            ..Self::default()
        }
    }

    /// A delta changing parallelism by `change`.
    pub fn parallel(change: i64) -> Self {
        Self {
            parallel_change: change,
            ..Self::default()
        }
    }
}

/// Errors from budget operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BudgetError {
    /// A limit was hit. A `BudgetExceeded` event has already been emitted.
    #[error("budget limit '{limit}' exceeded")]
    Exceeded {
        /// Name of the exceeded spec field.
        limit: &'static str,
    },

    /// The event log failed; the run must abort.
    #[error(transparent)]
    Log(#[from] LogError),
}

/// Tracks usage against a spec and enforces limits for one run.
pub struct BudgetManager {
    spec: BudgetSpec,
    usage: BudgetUsage,
    writer: EventWriter,
    started: Instant,
}

impl BudgetManager {
    /// Create a manager bound to a run's event writer. The time budget
    /// starts counting now.
    pub fn new(spec: BudgetSpec, writer: EventWriter) -> Self {
        Self {
            spec,
            usage: BudgetUsage::default(),
            writer,
            started: Instant::now(),
        }
    }

    /// Current usage.
    pub fn usage(&self) -> &BudgetUsage {
        &self.usage
    }

    /// The spec being enforced.
    pub fn spec(&self) -> &BudgetSpec {
        &self.spec
    }

    /// Sample the clock and verify every limit. On the first exceeded
    /// limit, emits `BudgetExceeded{limit, usage, spec}` and returns
    /// [`BudgetError::Exceeded`].
    pub fn check(&mut self) -> Result<(), BudgetError> {
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed > self.usage.time_elapsed_s {
            self.usage.time_elapsed_s = elapsed;
        }
        if let Some(limit) = self.usage.exceeds(&self.spec) {
            tracing::warn!(limit, "budget limit exceeded");
            self.writer.emit(
                EventKind::BudgetExceeded,
                json!({
                    "limit": limit,
                    "usage": &self.usage,
                    "spec": &self.spec,
                }),
            )?;
            return Err(BudgetError::Exceeded { limit });
        }
        Ok(())
    }

    /// Apply a usage delta and emit `BudgetUpdated{delta, usage}`.
    pub fn apply(&mut self, delta: BudgetDelta) -> Result<(), LogError> {
        self.usage.tokens_used += delta.tokens;
        self.usage.tool_calls_used += delta.tool_calls;
        self.usage.time_elapsed_s += delta.time_s;
        self.usage.current_recursion_depth += delta.recursion_depth_change;
        self.usage.current_parallel += delta.parallel_change;
        self.writer.emit(
            EventKind::BudgetUpdated,
            json!({
                "delta": &delta,
                "usage": &self.usage,
            }),
        )?;
        Ok(())
    }

    /// Record one tool call against the budget.
    pub fn record_tool_call(&mut self) -> Result<(), LogError> {
        self.apply(BudgetDelta::tool_call())
    }

    /// Record token usage against the budget.
    pub fn record_tokens(&mut self, tokens: u64) -> Result<(), LogError> {
        self.apply(BudgetDelta::tokens(tokens))
    }
}
