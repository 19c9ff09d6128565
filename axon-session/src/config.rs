//! Session configuration.

use axon0::id::SessionId;
use axon_governance::budget::BudgetSpec;

/// One agent slot in a session: a role, a model, and optional overrides.
#[derive(Debug, Clone)]
pub struct AgentSlotConfig {
    /// Role name, validated against the pack at creation time.
    pub role: String,
    /// Model identifier handed to the provider factory.
    pub model: String,
    /// How many agents to run in this slot.
    pub count: u32,
    /// Replaces the role's system prompt when set.
    pub system_prompt_override: Option<String>,
    /// Replaces the role's budget profile when set.
    pub budget_override: Option<BudgetSpec>,
}

impl AgentSlotConfig {
    /// A single-agent slot with no overrides.
    pub fn new(role: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            model: model.into(),
            count: 1,
            system_prompt_override: None,
            budget_override: None,
        }
    }
}

/// Configuration for one orchestrated session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// The session's identity.
    pub session_id: SessionId,
    /// The domain pack to draw tools and roles from.
    pub domain_pack: String,
    /// The pack workflow being run.
    pub workflow: String,
    /// Agent slots, executed as a linear chain in declaration order.
    pub agents: Vec<AgentSlotConfig>,
    /// Parallelism cap for the session's DAG.
    pub max_parallel: usize,
}

impl SessionConfig {
    /// Total number of agents across all slots.
    pub fn agent_count(&self) -> u32 {
        self.agents.iter().map(|slot| slot.count).sum()
    }
}
