//! Context packs — claims with evidence, freshness, and confidence,
//! assembled from the semantic store for decision-making.

use crate::semantic::{ConflictRecord, Fact, SemanticStore};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A piece of evidence backing a claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// The underlying fact.
    pub fact: Fact,
    /// Relevance weight: 1.0 for the key's latest fact, 0.5 for older.
    pub relevance: f64,
}

/// A claim assembled from a key's facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    /// The key the claim is about.
    pub key: String,
    /// The claimed (latest) value.
    pub value: Value,
    /// The key's history as weighted evidence.
    pub evidence: Vec<EvidenceItem>,
    /// Conflict records touching this key.
    pub conflicts: Vec<ConflictRecord>,
    /// 1.0 = just produced, decaying linearly to 0.0 at the max age.
    pub freshness_score: f64,
}

impl Claim {
    /// Whether any conflicts touch this claim.
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    /// Unresolved conflicts only.
    pub fn unresolved_conflicts(&self) -> Vec<&ConflictRecord> {
        self.conflicts.iter().filter(|c| !c.resolved).collect()
    }

    /// Mean of evidence `confidence × relevance`, minus 0.1 per
    /// unresolved conflict, clamped to [0, 1]. No evidence means 0.
    pub fn confidence(&self) -> f64 {
        if self.evidence.is_empty() {
            return 0.0;
        }
        let mean = self
            .evidence
            .iter()
            .map(|e| e.fact.confidence * e.relevance)
            .sum::<f64>()
            / self.evidence.len() as f64;
        let penalty = 0.1 * self.unresolved_conflicts().len() as f64;
        (mean - penalty).clamp(0.0, 1.0)
    }
}

/// A set of claims built for one decision context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextPack {
    /// The assembled claims.
    pub claims: Vec<Claim>,
}

impl ContextPack {
    /// Claims with at least one conflict.
    pub fn conflicted_claims(&self) -> Vec<&Claim> {
        self.claims.iter().filter(|c| c.has_conflicts()).collect()
    }

    /// Claims without conflicts.
    pub fn clean_claims(&self) -> Vec<&Claim> {
        self.claims.iter().filter(|c| !c.has_conflicts()).collect()
    }
}

/// Builds context packs from a semantic store.
pub struct ContextPackBuilder {
    max_age_seconds: f64,
}

impl ContextPackBuilder {
    /// Create a builder with a freshness horizon.
    pub fn new(max_age_seconds: f64) -> Self {
        Self { max_age_seconds }
    }

    /// Build a pack for the given keys (all keys if `None`).
    pub fn build(&self, store: &SemanticStore, keys: Option<&[String]>) -> ContextPack {
        let target_keys: Vec<String> = match keys {
            Some(keys) => keys.to_vec(),
            None => store.keys(),
        };
        let all_conflicts = store.get_conflicts(false);

        let mut claims = Vec::new();
        for key in target_keys {
            let Some(latest) = store.get(&key) else {
                continue;
            };
            let history = store.get_history(&key);
            let last_index = history.len() - 1;
            let evidence = history
                .iter()
                .enumerate()
                .map(|(i, fact)| EvidenceItem {
                    fact: fact.clone(),
                    relevance: if i == last_index { 1.0 } else { 0.5 },
                })
                .collect();
            let conflicts = all_conflicts
                .iter()
                .filter(|c| c.key == key)
                .map(|c| (*c).clone())
                .collect();

            claims.push(Claim {
                value: latest.value.clone(),
                freshness_score: self.freshness(latest),
                key,
                evidence,
                conflicts,
            });
        }

        ContextPack { claims }
    }

    /// Build a pack for all keys under a prefix.
    pub fn build_for_prefix(&self, store: &SemanticStore, prefix: &str) -> ContextPack {
        let mut keys: Vec<String> = store.query_by_prefix(prefix).into_keys().collect();
        keys.sort();
        self.build(store, Some(&keys))
    }

    fn freshness(&self, fact: &Fact) -> f64 {
        let age = (Utc::now() - fact.provenance.timestamp).num_milliseconds() as f64 / 1000.0;
        if age <= 0.0 || self.max_age_seconds <= 0.0 {
            return 1.0;
        }
        (1.0 - age / self.max_age_seconds).max(0.0)
    }
}

impl Default for ContextPackBuilder {
    fn default() -> Self {
        Self::new(3600.0)
    }
}
