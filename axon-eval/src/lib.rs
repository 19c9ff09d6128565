#![deny(missing_docs)]
//! Evaluation harness — run cases against the kernel and aggregate
//! outcomes.
//!
//! A case is setup → run → teardown with timing; failures in `run` become
//! ERROR results instead of propagating, and a failed teardown is logged
//! but never overrides the case's outcome.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// How a case ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvalOutcome {
    /// The case's expectation held.
    Passed,
    /// The expectation did not hold.
    Failed,
    /// The case itself blew up.
    Error,
    /// The case chose not to run.
    Skipped,
}

/// The result of one case execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalResult {
    /// The case's name.
    pub case_name: String,
    /// How it ended.
    pub outcome: EvalOutcome,
    /// Wall-clock duration in seconds.
    pub duration_s: f64,
    /// Error message for ERROR outcomes.
    pub error_message: Option<String>,
    /// Case-specific detail (scores, counts).
    pub details: Value,
}

impl EvalResult {
    /// A result with the given outcome and no details.
    pub fn new(case_name: impl Into<String>, outcome: EvalOutcome) -> Self {
        Self {
            case_name: case_name.into(),
            outcome,
            duration_s: 0.0,
            error_message: None,
            details: Value::Null,
        }
    }

    /// Attach detail data.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// One evaluation case.
#[async_trait]
pub trait EvalCase: Send + Sync {
    /// The case's unique name.
    fn name(&self) -> &str;

    /// Tags for suite filtering.
    fn tags(&self) -> Vec<String> {
        Vec::new()
    }

    /// Prepare fixtures. Errors become ERROR results.
    async fn setup(&self) -> Result<(), String> {
        Ok(())
    }

    /// Execute the case. Errors become ERROR results.
    async fn run(&self) -> Result<EvalResult, String>;

    /// Clean up fixtures. Errors are logged, not reported.
    async fn teardown(&self) -> Result<(), String> {
        Ok(())
    }
}

/// A named collection of cases.
#[derive(Default)]
pub struct EvalSuite {
    /// The suite's name.
    pub name: String,
    cases: Vec<Arc<dyn EvalCase>>,
}

impl EvalSuite {
    /// Create an empty suite.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cases: Vec::new(),
        }
    }

    /// Add a case.
    pub fn add(&mut self, case: Arc<dyn EvalCase>) {
        self.cases.push(case);
    }

    /// All cases.
    pub fn cases(&self) -> &[Arc<dyn EvalCase>] {
        &self.cases
    }

    /// Cases carrying a tag.
    pub fn filter_by_tag(&self, tag: &str) -> Vec<Arc<dyn EvalCase>> {
        self.cases
            .iter()
            .filter(|case| case.tags().iter().any(|t| t == tag))
            .cloned()
            .collect()
    }
}

/// Aggregate metrics over collected results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalMetrics {
    /// Total cases run.
    pub total: usize,
    /// PASSED count.
    pub passed: usize,
    /// FAILED count.
    pub failed: usize,
    /// ERROR count.
    pub errored: usize,
    /// SKIPPED count.
    pub skipped: usize,
    /// passed / (total − skipped), 0 when nothing ran.
    pub pass_rate: f64,
    /// Sum of durations in seconds.
    pub total_duration_s: f64,
    /// Mean duration in seconds, 0 when nothing ran.
    pub mean_duration_s: f64,
}

/// Compute metrics from a result set.
pub fn compute_metrics(results: &[EvalResult]) -> EvalMetrics {
    let mut metrics = EvalMetrics {
        total: results.len(),
        ..EvalMetrics::default()
    };
    for result in results {
        match result.outcome {
            EvalOutcome::Passed => metrics.passed += 1,
            EvalOutcome::Failed => metrics.failed += 1,
            EvalOutcome::Error => metrics.errored += 1,
            EvalOutcome::Skipped => metrics.skipped += 1,
        }
        metrics.total_duration_s += result.duration_s;
    }
    let considered = metrics.total - metrics.skipped;
    if considered > 0 {
        metrics.pass_rate = metrics.passed as f64 / considered as f64;
    }
    if metrics.total > 0 {
        metrics.mean_duration_s = metrics.total_duration_s / metrics.total as f64;
    }
    metrics
}

/// Executes cases and collects results.
#[derive(Default)]
pub struct EvalRunner {
    results: Vec<EvalResult>,
}

impl EvalRunner {
    /// Create an empty runner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Results collected so far.
    pub fn results(&self) -> &[EvalResult] {
        &self.results
    }

    /// Run one case with setup/teardown and timing.
    pub async fn run_case(&mut self, case: &Arc<dyn EvalCase>) -> EvalResult {
        let start = Instant::now();
        let outcome = match case.setup().await {
            Ok(()) => case.run().await,
            Err(message) => Err(format!("setup failed: {message}")),
        };
        let mut result = match outcome {
            Ok(mut result) => {
                result.duration_s = start.elapsed().as_secs_f64();
                result
            }
            Err(message) => EvalResult {
                case_name: case.name().to_string(),
                outcome: EvalOutcome::Error,
                duration_s: start.elapsed().as_secs_f64(),
                error_message: Some(message),
                details: Value::Null,
            },
        };
        if let Err(message) = case.teardown().await {
            tracing::warn!(case = case.name(), %message, "teardown failed");
        }
        result.case_name = case.name().to_string();
        self.results.push(result.clone());
        result
    }

    /// Run a suite, optionally filtered by tag.
    pub async fn run_suite(&mut self, suite: &EvalSuite, tag: Option<&str>) -> Vec<EvalResult> {
        let cases = match tag {
            Some(tag) => suite.filter_by_tag(tag),
            None => suite.cases().to_vec(),
        };
        let mut results = Vec::with_capacity(cases.len());
        for case in &cases {
            results.push(self.run_case(case).await);
        }
        results
    }

    /// Metrics over everything collected so far.
    pub fn compute_metrics(&self) -> EvalMetrics {
        compute_metrics(&self.results)
    }

    /// Clear collected results.
    pub fn reset(&mut self) {
        self.results.clear();
    }
}
