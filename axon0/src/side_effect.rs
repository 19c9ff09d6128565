//! Side-effect classification for tool capabilities.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a tool interacts with the world. Drives permission evaluation and
/// replay re-execution eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SideEffect {
    /// Deterministic over its inputs. Safe to re-execute during replay.
    Pure,
    /// Observes external state without mutating it.
    Read,
    /// Mutates managed state.
    Write,
    /// Non-recoverable mutation.
    Destructive,
}

impl SideEffect {
    /// The wire name (`PURE`, `READ`, `WRITE`, `DESTRUCTIVE`).
    pub fn as_str(&self) -> &'static str {
        match self {
            SideEffect::Pure => "PURE",
            SideEffect::Read => "READ",
            SideEffect::Write => "WRITE",
            SideEffect::Destructive => "DESTRUCTIVE",
        }
    }

    /// Parse a wire name.
    pub fn parse(s: &str) -> Option<SideEffect> {
        match s {
            "PURE" => Some(SideEffect::Pure),
            "READ" => Some(SideEffect::Read),
            "WRITE" => Some(SideEffect::Write),
            "DESTRUCTIVE" => Some(SideEffect::Destructive),
            _ => None,
        }
    }
}

impl fmt::Display for SideEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
