//! Semantic memory — structured facts with provenance and conflicts.
//!
//! Facts are keyed by dotted strings and kept as per-key histories.
//! A new fact whose value differs from the key's latest creates a
//! conflict record; both facts are kept. Conflicts address their facts
//! by index into the key's history vector, so records serialize without
//! dragging fact copies along.

use axon0::id::RunId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Where a fact came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// The run that produced the fact.
    pub run_id: RunId,
    /// The producing task, if any.
    #[serde(default)]
    pub task_name: String,
    /// The producing tool, if any.
    #[serde(default)]
    pub tool_name: String,
    /// When the fact was recorded.
    pub timestamp: DateTime<Utc>,
}

impl Provenance {
    /// Provenance for a run, stamped now.
    pub fn from_run(run_id: RunId) -> Self {
        Self {
            run_id,
            task_name: String::new(),
            tool_name: String::new(),
            timestamp: Utc::now(),
        }
    }
}

/// A single structured fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    /// Dotted key, e.g. `"model.accuracy"`.
    pub key: String,
    /// The fact's value.
    pub value: Value,
    /// Where it came from.
    pub provenance: Provenance,
    /// Confidence in [0, 1].
    pub confidence: f64,
}

impl Fact {
    /// Build a fact with full confidence.
    pub fn new(key: impl Into<String>, value: Value, provenance: Provenance) -> Self {
        Self {
            key: key.into(),
            value,
            provenance,
            confidence: 1.0,
        }
    }

    /// Override the confidence, clamped to [0, 1].
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }
}

/// A detected disagreement between two facts under one key. Facts are
/// addressed by index into the key's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// The contested key.
    pub key: String,
    /// Index of the previously latest fact.
    pub fact_a: usize,
    /// Index of the newly added fact.
    pub fact_b: usize,
    /// Whether the conflict has been resolved.
    pub resolved: bool,
    /// Resolution note, empty until resolved.
    pub resolution: String,
}

/// Fact store with per-key history and conflict detection.
#[derive(Default)]
pub struct SemanticStore {
    facts: HashMap<String, Vec<Fact>>,
    conflicts: Vec<ConflictRecord>,
}

impl SemanticStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fact. Returns the index of the created conflict record if
    /// the fact disagrees with the key's latest value.
    pub fn add(&mut self, fact: Fact) -> Option<usize> {
        let history = self.facts.entry(fact.key.clone()).or_default();
        let conflict = match history.last() {
            Some(latest) if latest.value != fact.value => Some(ConflictRecord {
                key: fact.key.clone(),
                fact_a: history.len() - 1,
                fact_b: history.len(),
                resolved: false,
                resolution: String::new(),
            }),
            _ => None,
        };
        history.push(fact);

        conflict.map(|record| {
            self.conflicts.push(record);
            self.conflicts.len() - 1
        })
    }

    /// The latest fact for a key.
    pub fn get(&self, key: &str) -> Option<&Fact> {
        self.facts.get(key).and_then(|history| history.last())
    }

    /// All facts for a key, oldest first.
    pub fn get_history(&self, key: &str) -> &[Fact] {
        self.facts.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Latest fact per key matching a prefix.
    pub fn query_by_prefix(&self, prefix: &str) -> HashMap<String, &Fact> {
        self.facts
            .iter()
            .filter(|(key, history)| key.starts_with(prefix) && !history.is_empty())
            .filter_map(|(key, history)| history.last().map(|fact| (key.clone(), fact)))
            .collect()
    }

    /// Every fact whose provenance points at a run.
    pub fn query_by_run(&self, run_id: &RunId) -> Vec<&Fact> {
        let mut result: Vec<&Fact> = self
            .facts
            .values()
            .flatten()
            .filter(|fact| &fact.provenance.run_id == run_id)
            .collect();
        result.sort_by(|a, b| a.key.cmp(&b.key));
        result
    }

    /// Conflict records, optionally only unresolved ones.
    pub fn get_conflicts(&self, unresolved_only: bool) -> Vec<&ConflictRecord> {
        self.conflicts
            .iter()
            .filter(|c| !unresolved_only || !c.resolved)
            .collect()
    }

    /// The two facts a conflict refers to, `(previous_latest, newer)`.
    pub fn conflict_facts(&self, conflict: &ConflictRecord) -> Option<(&Fact, &Fact)> {
        let history = self.facts.get(&conflict.key)?;
        Some((history.get(conflict.fact_a)?, history.get(conflict.fact_b)?))
    }

    /// Mark a conflict resolved. Returns false for an unknown index.
    pub fn resolve_conflict(&mut self, index: usize, resolution: impl Into<String>) -> bool {
        match self.conflicts.get_mut(index) {
            Some(conflict) => {
                conflict.resolved = true;
                conflict.resolution = resolution.into();
                true
            }
            None => false,
        }
    }

    /// All keys holding at least one fact, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .facts
            .iter()
            .filter(|(_, history)| !history.is_empty())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.facts.len()
    }

    /// Whether the store holds no facts.
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}
