#![deny(missing_docs)]
//! Tool capability interface and registry for axon.
//!
//! A tool is a named, versioned capability with structured I/O and a
//! side-effect classification. Any tool source (local function, subprocess,
//! remote endpoint) implements [`Tool`]; the kernel stores tools as
//! `Arc<dyn Tool>` in a [`ToolRegistry`] and dispatches through
//! [`execute_validated`], which checks input and output against the tool's
//! declared schemas.

use axon0::side_effect::SideEffect;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

pub mod schema;

/// Errors from tool operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ToolError {
    /// The requested tool is not in the registry.
    #[error("tool not found: {0}")]
    NotFound(String),

    /// The input failed validation against the tool's input schema.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The output failed validation against the tool's output schema.
    #[error("invalid output: {0}")]
    InvalidOutput(String),

    /// Tool execution failed.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Object-safe trait for tool implementations.
///
/// Tools are stored as `Arc<dyn Tool>`. Implementations declare their
/// schemas as JSON-schema-like structural descriptions consumed by
/// [`schema::validate`] — the kernel does not interpret anything beyond
/// that subset.
pub trait Tool: Send + Sync {
    /// The tool's unique name.
    fn name(&self) -> &str;

    /// The tool's version string.
    fn version(&self) -> &str {
        "0.1.0"
    }

    /// Human-readable description of what the tool does.
    fn description(&self) -> &str;

    /// How the tool interacts with the world.
    fn side_effect(&self) -> SideEffect;

    /// Structural schema for the tool's input.
    fn input_schema(&self) -> Value;

    /// Structural schema for the tool's output.
    fn output_schema(&self) -> Value;

    /// Execute the tool with already-validated input.
    fn call(
        &self,
        input: Value,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + '_>>;
}

/// Registry of tools available to an executor.
///
/// Read-only after construction from the executors' point of view; the
/// owning session or caller registers everything up front.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Overwrites any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Whether a tool with this name is registered.
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Iterate over all registered tools.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.tools.values()
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate input, execute, validate output.
///
/// This is the kernel's canonical dispatch path: executors call this
/// instead of [`Tool::call`] so every invocation is schema-checked on
/// both sides.
pub async fn execute_validated(tool: &Arc<dyn Tool>, input: Value) -> Result<Value, ToolError> {
    let input_report = schema::validate(&input, &tool.input_schema());
    if !input_report.valid {
        return Err(ToolError::InvalidInput(input_report.errors.join("; ")));
    }
    let output = tool.call(input).await?;
    let output_report = schema::validate(&output, &tool.output_schema());
    if !output_report.valid {
        return Err(ToolError::InvalidOutput(output_report.errors.join("; ")));
    }
    Ok(output)
}
