//! Side-effect permission policy.
//!
//! Rules are evaluated in order; the first rule whose side effect matches
//! wins. If none match, the default action applies. Every evaluation that
//! reaches `check()` is recorded as a `PolicyDecision` event, ALLOW or DENY.

use axon0::event::EventKind;
use axon0::log::{EventWriter, LogError};
use axon0::side_effect::SideEffect;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

/// What a matched rule (or the default) does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PolicyAction {
    /// Permit the call.
    Allow,
    /// Refuse the call.
    Deny,
}

impl PolicyAction {
    /// Wire name (`ALLOW` / `DENY`).
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyAction::Allow => "ALLOW",
            PolicyAction::Deny => "DENY",
        }
    }
}

/// A single policy rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionRule {
    /// The side-effect class this rule matches.
    pub side_effect: SideEffect,
    /// What to do on match.
    pub action: PolicyAction,
    /// Why. Empty reasons get a generated one at evaluation time.
    #[serde(default)]
    pub reason: String,
}

impl PermissionRule {
    /// Build a rule.
    pub fn new(side_effect: SideEffect, action: PolicyAction, reason: impl Into<String>) -> Self {
        Self {
            side_effect,
            action,
            reason: reason.into(),
        }
    }
}

/// An ordered rule list plus a default action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionPolicy {
    /// Rules, evaluated first to last.
    #[serde(default)]
    pub rules: Vec<PermissionRule>,
    /// Applied when no rule matches.
    pub default_action: PolicyAction,
}

impl PermissionPolicy {
    /// A policy that allows everything.
    pub fn allow_all() -> Self {
        Self {
            rules: vec![],
            default_action: PolicyAction::Allow,
        }
    }

    /// A policy that denies everything.
    pub fn deny_all() -> Self {
        Self {
            rules: vec![],
            default_action: PolicyAction::Deny,
        }
    }

    /// First-match evaluation. Returns the action and its reason.
    pub fn evaluate(&self, side_effect: SideEffect) -> (PolicyAction, String) {
        for rule in &self.rules {
            if rule.side_effect == side_effect {
                let reason = if rule.reason.is_empty() {
                    format!("Matched rule for {side_effect}")
                } else {
                    rule.reason.clone()
                };
                return (rule.action, reason);
            }
        }
        (
            self.default_action,
            format!("Default policy: {}", self.default_action.as_str()),
        )
    }
}

impl Default for PermissionPolicy {
    fn default() -> Self {
        Self::deny_all()
    }
}

/// Errors from permission checks.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum PermissionError {
    /// The policy denied the call. A `PolicyDecision` event with
    /// action DENY has already been emitted.
    #[error("tool '{tool_name}' denied: {reason} (side_effect={side_effect})")]
    Denied {
        /// The tool that was refused.
        tool_name: String,
        /// The matched rule's (or default's) reason.
        reason: String,
        /// The side-effect class that matched.
        side_effect: SideEffect,
    },

    /// The event log failed; the run must abort.
    #[error(transparent)]
    Log(#[from] LogError),
}

/// Evaluates tool calls against a policy, recording every decision.
pub struct PermissionsEngine {
    policy: PermissionPolicy,
    writer: EventWriter,
}

impl PermissionsEngine {
    /// Create an engine bound to a run's event writer.
    pub fn new(policy: PermissionPolicy, writer: EventWriter) -> Self {
        Self { policy, writer }
    }

    /// The policy being enforced.
    pub fn policy(&self) -> &PermissionPolicy {
        &self.policy
    }

    /// Record a `PolicyDecision` and fail on DENY.
    pub fn check(&self, tool_name: &str, side_effect: SideEffect) -> Result<(), PermissionError> {
        let (action, reason) = self.policy.evaluate(side_effect);
        self.writer.emit(
            EventKind::PolicyDecision,
            json!({
                "tool_name": tool_name,
                "side_effect": side_effect.as_str(),
                "action": action.as_str(),
                "reason": &reason,
            }),
        )?;
        if action == PolicyAction::Deny {
            tracing::debug!(tool_name, %side_effect, "tool call denied by policy");
            return Err(PermissionError::Denied {
                tool_name: tool_name.to_string(),
                reason,
                side_effect,
            });
        }
        Ok(())
    }
}
