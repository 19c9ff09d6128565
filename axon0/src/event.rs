//! The sealed event union — the kernel's sole form of observable state change.
//!
//! Every subsystem either writes events or derives views from them. An event
//! is immutable once appended; `(run_id, seq)` is its identity.

use crate::id::RunId;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The closed set of event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// An executor run began. Always seq 0 of its run.
    RunStarted,
    /// An executor run reached its terminal state. Payload carries `outcome`.
    RunFinished,
    /// A workflow task began executing.
    TaskStarted,
    /// A workflow task reached a terminal state.
    TaskFinished,
    /// A governed tool invocation began.
    ToolCallStarted,
    /// A governed tool invocation completed (successfully or not).
    ToolCallFinished,
    /// Budget usage changed.
    BudgetUpdated,
    /// A budget limit was hit. The next terminal event carries outcome BUDGET_EXCEEDED.
    BudgetExceeded,
    /// The permission policy ruled on a tool call.
    PolicyDecision,
    /// A stop condition fired.
    StopCondition,
    /// One step of the tool-calling agent loop began.
    AgentStepStarted,
    /// One step of the tool-calling agent loop finished. Payload carries `result`.
    AgentStepFinished,
    /// A language-model call began.
    LMCallStarted,
    /// A language-model call finished. Payload carries token counts.
    LMCallFinished,
    /// One iteration of the recursive LM loop began.
    RLMIterationStarted,
    /// One iteration of the recursive LM loop finished.
    RLMIterationFinished,
    /// A sandbox execution began. Payload carries `code_hash`.
    REPLExecStarted,
    /// A sandbox execution finished.
    REPLExecFinished,
    /// An orchestrated session began.
    SessionStarted,
    /// An orchestrated session reached its terminal state.
    SessionFinished,
}

impl EventKind {
    /// All kinds, in declaration order.
    pub const ALL: [EventKind; 20] = [
        EventKind::RunStarted,
        EventKind::RunFinished,
        EventKind::TaskStarted,
        EventKind::TaskFinished,
        EventKind::ToolCallStarted,
        EventKind::ToolCallFinished,
        EventKind::BudgetUpdated,
        EventKind::BudgetExceeded,
        EventKind::PolicyDecision,
        EventKind::StopCondition,
        EventKind::AgentStepStarted,
        EventKind::AgentStepFinished,
        EventKind::LMCallStarted,
        EventKind::LMCallFinished,
        EventKind::RLMIterationStarted,
        EventKind::RLMIterationFinished,
        EventKind::REPLExecStarted,
        EventKind::REPLExecFinished,
        EventKind::SessionStarted,
        EventKind::SessionFinished,
    ];

    /// The kind's wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::RunStarted => "RunStarted",
            EventKind::RunFinished => "RunFinished",
            EventKind::TaskStarted => "TaskStarted",
            EventKind::TaskFinished => "TaskFinished",
            EventKind::ToolCallStarted => "ToolCallStarted",
            EventKind::ToolCallFinished => "ToolCallFinished",
            EventKind::BudgetUpdated => "BudgetUpdated",
            EventKind::BudgetExceeded => "BudgetExceeded",
            EventKind::PolicyDecision => "PolicyDecision",
            EventKind::StopCondition => "StopCondition",
            EventKind::AgentStepStarted => "AgentStepStarted",
            EventKind::AgentStepFinished => "AgentStepFinished",
            EventKind::LMCallStarted => "LMCallStarted",
            EventKind::LMCallFinished => "LMCallFinished",
            EventKind::RLMIterationStarted => "RLMIterationStarted",
            EventKind::RLMIterationFinished => "RLMIterationFinished",
            EventKind::REPLExecStarted => "REPLExecStarted",
            EventKind::REPLExecFinished => "REPLExecFinished",
            EventKind::SessionStarted => "SessionStarted",
            EventKind::SessionFinished => "SessionFinished",
        }
    }

    /// Parse a wire name back into a kind.
    pub fn parse(s: &str) -> Option<EventKind> {
        EventKind::ALL.iter().copied().find(|k| k.as_str() == s)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable record in the append-only log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// The run this event belongs to.
    pub run_id: RunId,
    /// Position within the run. Dense from 0 per run.
    pub seq: u64,
    /// Append time, UTC.
    pub timestamp: DateTime<Utc>,
    /// Which kind of event this is.
    pub kind: EventKind,
    /// Kind-specific payload.
    pub payload: Value,
}

impl Event {
    /// Build an event stamped with the current time.
    pub fn new(run_id: RunId, seq: u64, kind: EventKind, payload: Value) -> Self {
        Self {
            run_id,
            seq,
            timestamp: Utc::now(),
            kind,
            payload,
        }
    }

    /// The timestamp in RFC 3339 with millisecond precision, as persisted.
    pub fn timestamp_rfc3339(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_names_round_trip() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::parse("NotAKind"), None);
    }

    #[test]
    fn kind_serde_uses_wire_names() {
        let s = serde_json::to_string(&EventKind::ToolCallStarted).unwrap();
        assert_eq!(s, "\"ToolCallStarted\"");
    }

    #[test]
    fn timestamp_has_millisecond_precision() {
        let event = Event::new(RunId::new("r1"), 0, EventKind::RunStarted, json!({}));
        let ts = event.timestamp_rfc3339();
        // e.g. 2026-08-01T12:34:56.789Z
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.split('.').nth(1).map(|frac| frac.len()), Some(4));
    }
}
