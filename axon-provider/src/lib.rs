#![deny(missing_docs)]
//! Language-model provider boundary for axon.
//!
//! The kernel never speaks HTTP. Concrete transports (Anthropic, OpenAI,
//! local runtimes) live outside and implement [`Provider`]; the executors
//! consume the trait. The trait is object-safe on purpose — sessions and
//! sandbox host functions hold `Arc<dyn Provider>`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[cfg(feature = "test-utils")]
pub mod test_utils;

/// Errors from LM providers.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport-level failure.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// Provider rate-limited the request.
    #[error("rate limited")]
    RateLimited,

    /// Authentication/authorization failed.
    #[error("auth failed: {0}")]
    AuthFailed(String),

    /// Could not interpret the provider's response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ProviderError {
    /// Whether retrying this request might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited | ProviderError::RequestFailed(_)
        )
    }
}

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions.
    System,
    /// User (or kernel feedback) message.
    User,
    /// Model message.
    Assistant,
}

/// A single message in an LM conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LmMessage {
    /// Author role.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl LmMessage {
    /// Build a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Build a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Build an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Response from a provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LmResponse {
    /// Generated text.
    pub content: String,
    /// Total tokens consumed by the call.
    pub tokens_used: u64,
    /// Prompt-side tokens.
    pub prompt_tokens: u64,
    /// Completion-side tokens.
    pub completion_tokens: u64,
}

impl LmResponse {
    /// Build a response whose token counts are derived from content length.
    /// Useful for local runtimes that don't report usage.
    pub fn from_text(content: impl Into<String>) -> Self {
        let content = content.into();
        let completion_tokens = content.chars().count() as u64;
        Self {
            tokens_used: completion_tokens,
            prompt_tokens: 0,
            completion_tokens,
            content,
        }
    }
}

/// LM provider interface.
///
/// `complete` is the required surface. `generate_structured` exists for
/// providers with native structured output (tool-use APIs, JSON modes) and
/// falls back to `complete` by default.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name (e.g. `"anthropic-claude"`, `"local-stub"`).
    fn name(&self) -> &str;

    /// Generate a completion from a conversation.
    async fn complete(&self, messages: &[LmMessage]) -> Result<LmResponse, ProviderError>;

    /// Generate structured output. Providers without native support fall
    /// back to plain completion.
    async fn generate_structured(
        &self,
        messages: &[LmMessage],
        _schema: Option<&Value>,
        _tool_schemas: Option<&[Value]>,
    ) -> Result<LmResponse, ProviderError> {
        self.complete(messages).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_retryable() {
        assert!(ProviderError::RateLimited.is_retryable());
        assert!(ProviderError::RequestFailed("timeout".into()).is_retryable());
        assert!(!ProviderError::AuthFailed("bad key".into()).is_retryable());
        assert!(!ProviderError::InvalidResponse("x".into()).is_retryable());
    }

    #[test]
    fn role_serde_is_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
    }

    #[test]
    fn from_text_counts_chars() {
        let r = LmResponse::from_text("abcd");
        assert_eq!(r.tokens_used, 4);
        assert_eq!(r.completion_tokens, 4);
        assert_eq!(r.prompt_tokens, 0);
    }

    fn _assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn provider_is_object_safe() {
        _assert_send_sync::<std::sync::Arc<dyn Provider>>();
    }
}
