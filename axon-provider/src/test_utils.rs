//! Provider test doubles, enabled with the `test-utils` feature.

use crate::{LmMessage, LmResponse, Provider, ProviderError};
use async_trait::async_trait;
use std::sync::Mutex;

/// A provider that plays back a fixed script of responses.
///
/// Calls pop responses in order; once the script is exhausted the last
/// response repeats. Token counts come from each response as constructed.
pub struct ScriptedProvider {
    responses: Vec<LmResponse>,
    cursor: Mutex<usize>,
    calls: Mutex<Vec<Vec<LmMessage>>>,
}

impl ScriptedProvider {
    /// Create a provider from canned responses. The script must be non-empty.
    pub fn new(responses: Vec<LmResponse>) -> Self {
        assert!(!responses.is_empty(), "script must contain at least one response");
        Self {
            responses,
            cursor: Mutex::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Convenience: a script of plain-text responses with length-derived tokens.
    pub fn from_texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| LmResponse::from_text(*t)).collect())
    }

    /// How many completions have been served.
    pub fn call_count(&self) -> usize {
        *self.cursor.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Message histories seen by each call, in order.
    pub fn recorded_calls(&self) -> Vec<Vec<LmMessage>> {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, messages: &[LmMessage]) -> Result<LmResponse, ProviderError> {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(messages.to_vec());
        let mut cursor = self.cursor.lock().unwrap_or_else(|p| p.into_inner());
        let index = (*cursor).min(self.responses.len() - 1);
        *cursor += 1;
        Ok(self.responses[index].clone())
    }
}

/// A provider that echoes the last message back. Tokens are length-derived.
pub struct EchoProvider;

#[async_trait]
impl Provider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, messages: &[LmMessage]) -> Result<LmResponse, ProviderError> {
        let last = messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(LmResponse::from_text(last))
    }
}

/// A provider that always fails. For error-path tests.
pub struct FailingProvider;

#[async_trait]
impl Provider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _messages: &[LmMessage]) -> Result<LmResponse, ProviderError> {
        Err(ProviderError::RequestFailed("scripted failure".into()))
    }
}
