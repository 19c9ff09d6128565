//! Runaway-execution detectors.
//!
//! Three detectors, checked in a fixed order: repeated identical tool
//! calls, consecutive failures, no-progress steps. Detectors accumulate
//! passively through the `record_*` methods and only act when `check()`
//! is called; a trigger emits a `StopCondition` event and returns the
//! reason.

use axon0::event::EventKind;
use axon0::log::{EventWriter, LogError};
use serde_json::json;
use std::collections::HashMap;

/// Trigger thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct StopLimits {
    /// A `name:input_hash` pair seen this many times triggers.
    pub max_repeated_tool_calls: u32,
    /// This many failures in a row triggers.
    pub max_consecutive_failures: u32,
    /// This many recorded steps without a success triggers.
    pub max_no_progress_steps: u32,
}

impl Default for StopLimits {
    fn default() -> Self {
        Self {
            max_repeated_tool_calls: 5,
            max_consecutive_failures: 3,
            max_no_progress_steps: 10,
        }
    }
}

/// Detects conditions that should halt a run.
pub struct StopChecker {
    writer: EventWriter,
    limits: StopLimits,
    tool_call_history: Vec<String>,
    consecutive_failures: u32,
    steps_since_progress: u32,
}

impl StopChecker {
    /// Create a checker bound to a run's event writer.
    pub fn new(writer: EventWriter, limits: StopLimits) -> Self {
        Self {
            writer,
            limits,
            tool_call_history: Vec::new(),
            consecutive_failures: 0,
            steps_since_progress: 0,
        }
    }

    /// Record a tool call for repeat detection.
    pub fn record_tool_call(&mut self, tool_name: &str, input_hash: &str) {
        self.tool_call_history
            .push(format!("{tool_name}:{input_hash}"));
    }

    /// Record a success; resets the failure and no-progress counters.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.steps_since_progress = 0;
    }

    /// Record a failure.
    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        self.steps_since_progress += 1;
    }

    /// Record a step that made no progress (e.g. a skipped task).
    pub fn record_step(&mut self) {
        self.steps_since_progress += 1;
    }

    /// Run the detectors in order. On the first trigger, emits
    /// `StopCondition{reason}` and returns the reason.
    pub fn check(&mut self) -> Result<Option<String>, LogError> {
        let reason = self
            .check_repeated_tool_calls()
            .or_else(|| self.check_consecutive_failures())
            .or_else(|| self.check_no_progress());
        if let Some(reason) = &reason {
            tracing::warn!(%reason, "stop condition triggered");
            self.writer
                .emit(EventKind::StopCondition, json!({"reason": reason}))?;
        }
        Ok(reason)
    }

    fn check_repeated_tool_calls(&self) -> Option<String> {
        if self.tool_call_history.is_empty() {
            return None;
        }
        let mut counts: HashMap<&str, u32> = HashMap::new();
        for key in &self.tool_call_history {
            let count = counts.entry(key.as_str()).or_insert(0);
            *count += 1;
            if *count >= self.limits.max_repeated_tool_calls {
                return Some(format!("Repeated identical tool call: {key} ({count} times)"));
            }
        }
        None
    }

    fn check_consecutive_failures(&self) -> Option<String> {
        if self.consecutive_failures >= self.limits.max_consecutive_failures {
            Some(format!(
                "Excessive consecutive failures: {} failures in a row",
                self.consecutive_failures
            ))
        } else {
            None
        }
    }

    fn check_no_progress(&self) -> Option<String> {
        if self.steps_since_progress >= self.limits.max_no_progress_steps {
            Some(format!(
                "No progress: {} steps without a success",
                self.steps_since_progress
            ))
        } else {
            None
        }
    }
}
