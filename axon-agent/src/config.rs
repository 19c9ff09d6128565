//! Agent loop configuration.

/// Configuration for one agent run.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Base system prompt. The action-protocol instructions and the tool
    /// descriptions are appended by the runner.
    pub system_prompt: String,
    /// Maximum loop steps.
    pub max_steps: u32,
    /// Consecutive parse errors tolerated before giving up.
    pub max_consecutive_errors: u32,
    /// Whether tool input schemas are included in the descriptions block.
    pub include_tool_schemas: bool,
}

/// The JSON protocol contract prepended to every agent's system prompt.
pub const ACTION_FORMAT: &str = "\
You are an AI agent with access to tools. \
You MUST respond with ONLY a single JSON object (no extra text).
For tool calls:
{\"action\": \"tool_call\", \"tool\": \"<tool_name>\", \"input\": {<tool_input>}, \"reasoning\": \"why\"}
When you are finished:
{\"action\": \"finish\", \"result\": \"<your final output>\", \"reasoning\": \"why\"}
";

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: String::new(),
            max_steps: 20,
            max_consecutive_errors: 3,
            include_tool_schemas: true,
        }
    }
}
