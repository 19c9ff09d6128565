//! The agent's JSON action protocol.
//!
//! The model must answer every step with exactly one JSON object, either a
//! tool call or a finish. Anything else is a parse error that is fed back
//! as a correction, counted toward the consecutive-error limit.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// One decoded model action.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AgentAction {
    /// `{"action":"tool_call","tool":…,"input":…,"reasoning":…}`
    ToolCall {
        /// The tool to invoke.
        tool: String,
        /// Structured tool input.
        #[serde(default)]
        input: Value,
        /// The model's stated reasoning (observability only).
        #[serde(default)]
        reasoning: Option<String>,
    },
    /// `{"action":"finish","result":…,"reasoning":…}`
    Finish {
        /// The final result string.
        #[serde(default)]
        result: String,
        /// The model's stated reasoning (observability only).
        #[serde(default)]
        reasoning: Option<String>,
    },
}

/// A response that was not a valid action object.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{0}")]
pub struct ActionParseError(pub String);

/// Decode a raw model response into an action.
///
/// Tolerates Markdown code fences and leading/trailing prose around the
/// JSON object, but requires exactly one decodable object.
pub fn parse_agent_action(raw: &str) -> Result<AgentAction, ActionParseError> {
    let trimmed = strip_fences(raw.trim());
    match serde_json::from_str::<AgentAction>(trimmed) {
        Ok(action) => Ok(action),
        Err(first_err) => {
            // Fall back to the outermost {...} span.
            if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
                if start < end {
                    if let Ok(action) = serde_json::from_str::<AgentAction>(&trimmed[start..=end])
                    {
                        return Ok(action);
                    }
                }
            }
            Err(ActionParseError(first_err.to_string()))
        }
    }
}

fn strip_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string ("json", "JSON", …) on the opening fence line.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_tool_call() {
        let action = parse_agent_action(
            r#"{"action":"tool_call","tool":"search","input":{"q":"x"},"reasoning":"why"}"#,
        )
        .unwrap();
        assert_eq!(
            action,
            AgentAction::ToolCall {
                tool: "search".into(),
                input: json!({"q": "x"}),
                reasoning: Some("why".into()),
            }
        );
    }

    #[test]
    fn parses_finish() {
        let action =
            parse_agent_action(r#"{"action":"finish","result":"done","reasoning":"ok"}"#).unwrap();
        assert!(matches!(action, AgentAction::Finish { result, .. } if result == "done"));
    }

    #[test]
    fn missing_input_defaults_to_null() {
        let action = parse_agent_action(r#"{"action":"tool_call","tool":"noargs"}"#).unwrap();
        assert_eq!(
            action,
            AgentAction::ToolCall {
                tool: "noargs".into(),
                input: Value::Null,
                reasoning: None,
            }
        );
    }

    #[test]
    fn strips_code_fences() {
        let raw = "```json\n{\"action\":\"finish\",\"result\":\"ok\"}\n```";
        assert!(parse_agent_action(raw).is_ok());
    }

    #[test]
    fn tolerates_surrounding_prose() {
        let raw = "Sure, here is my action:\n{\"action\":\"finish\",\"result\":\"ok\"}\nThanks!";
        assert!(parse_agent_action(raw).is_ok());
    }

    #[test]
    fn rejects_non_json() {
        assert!(parse_agent_action("I think I should search the web.").is_err());
    }

    #[test]
    fn rejects_unknown_action() {
        assert!(parse_agent_action(r#"{"action":"dance"}"#).is_err());
    }
}
