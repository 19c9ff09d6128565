//! Acceptance criteria checked against a `finish` action.
//!
//! When configured, the runner evaluates every criterion against the
//! agent's result before accepting it; failures are listed back to the
//! model and the loop continues.

use axon0::id::RunId;
use std::sync::Arc;

/// A single named acceptance criterion.
pub trait AcceptanceCriterion: Send + Sync {
    /// The criterion's name, used in feedback.
    fn name(&self) -> &str;

    /// Check the proposed result. `Err` carries the failure message.
    fn check(&self, result: &str, run_id: &RunId) -> Result<(), String>;
}

/// Outcome of one criterion.
#[derive(Debug, Clone, PartialEq)]
pub struct CriterionResult {
    /// Criterion name.
    pub name: String,
    /// Whether it passed.
    pub passed: bool,
    /// Failure message, empty on pass.
    pub message: String,
}

/// An ordered set of acceptance criteria.
#[derive(Default)]
pub struct AcceptanceChecker {
    criteria: Vec<Arc<dyn AcceptanceCriterion>>,
}

impl AcceptanceChecker {
    /// Create an empty checker (which accepts everything).
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a criterion.
    pub fn add(&mut self, criterion: Arc<dyn AcceptanceCriterion>) {
        self.criteria.push(criterion);
    }

    /// Evaluate every criterion. Returns whether all passed plus the
    /// individual results in order.
    pub fn check_all(&self, result: &str, run_id: &RunId) -> (bool, Vec<CriterionResult>) {
        let mut all_passed = true;
        let results = self
            .criteria
            .iter()
            .map(|criterion| match criterion.check(result, run_id) {
                Ok(()) => CriterionResult {
                    name: criterion.name().to_string(),
                    passed: true,
                    message: String::new(),
                },
                Err(message) => {
                    all_passed = false;
                    CriterionResult {
                        name: criterion.name().to_string(),
                        passed: false,
                        message,
                    }
                }
            })
            .collect();
        (all_passed, results)
    }
}

/// Build a criterion from a name and a closure.
pub fn criterion<F>(name: impl Into<String>, check: F) -> Arc<dyn AcceptanceCriterion>
where
    F: Fn(&str, &RunId) -> Result<(), String> + Send + Sync + 'static,
{
    struct Closure<F> {
        name: String,
        check: F,
    }

    impl<F> AcceptanceCriterion for Closure<F>
    where
        F: Fn(&str, &RunId) -> Result<(), String> + Send + Sync,
    {
        fn name(&self) -> &str {
            &self.name
        }

        fn check(&self, result: &str, run_id: &RunId) -> Result<(), String> {
            (self.check)(result, run_id)
        }
    }

    Arc::new(Closure {
        name: name.into(),
        check,
    })
}
