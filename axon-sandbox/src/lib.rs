#![deny(missing_docs)]
//! Persistent-namespace sandboxed interpreter for axon's recursive LM loop.
//!
//! The sandbox executes a small script language over JSON values: variables
//! persist across executions, `print` output is captured, and assignment to
//! the special name `FINAL` signals completion to the driving executor.
//!
//! Capabilities come from two fixed tables: a whitelist of numeric, string,
//! collection, and iteration builtins, and caller-registered async
//! [`host::HostFn`]s (the recursive executor registers `lm_query` this way).
//! A static pre-check rejects `import`/`from` lines and the tokens `open(`,
//! `eval(`, `exec(`, `__import__(` before anything is parsed.
//!
//! This is a correctness sandbox, not a security boundary against
//! adversarial code: scripts cannot touch the filesystem, network, or
//! process because no such capability exists in the language, but no
//! resource-exhaustion defenses beyond a range cap are attempted.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

mod host;
mod interp;
mod lexer;
mod parser;

pub use host::{HostFn, host_fn};

use interp::{Interp, display_value};

const MAX_REPR_LEN: usize = 200;

/// Snapshot of the visible namespace after an execution.
///
/// Names starting with `_` are excluded; callables never appear because
/// host functions live outside the namespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Variable name → truncated printable representation.
    pub variables: BTreeMap<String, String>,
    /// Whether `FINAL` has been assigned.
    pub has_final: bool,
    /// String rendering of `FINAL`, if assigned.
    pub final_value: Option<String>,
    /// How many executions this sandbox has run.
    pub iteration_count: u64,
}

/// Result of one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecResult {
    /// Captured `print` output.
    pub stdout: String,
    /// Error channel; mirrors `error_message` when a failure occurred.
    pub stderr: String,
    /// Whether the execution completed without error.
    pub success: bool,
    /// Error class (`SyntaxError`, `NameError`, `SafetyError`, …).
    pub error_type: Option<String>,
    /// Error message.
    pub error_message: Option<String>,
    /// Namespace state after the execution.
    pub state: Snapshot,
}

/// A persistent-namespace script sandbox.
pub struct Sandbox {
    namespace: HashMap<String, Value>,
    host_fns: HashMap<String, Arc<dyn HostFn>>,
    iteration_count: u64,
}

impl Sandbox {
    /// Create an empty sandbox.
    pub fn new() -> Self {
        Self {
            namespace: HashMap::new(),
            host_fns: HashMap::new(),
            iteration_count: 0,
        }
    }

    /// Seed a variable. Returns self for chaining at construction.
    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.namespace.insert(name.into(), value);
        self
    }

    /// Register a host function. Returns self for chaining at construction.
    pub fn with_host_fn(mut self, name: impl Into<String>, f: Arc<dyn HostFn>) -> Self {
        self.host_fns.insert(name.into(), f);
        self
    }

    /// Set a variable.
    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.namespace.insert(name.into(), value);
    }

    /// Read a variable.
    pub fn get_variable(&self, name: &str) -> Option<&Value> {
        self.namespace.get(name)
    }

    /// Execute a script in the persistent namespace.
    ///
    /// Failures are captured in the result, never propagated; the
    /// namespace keeps whatever assignments completed before the error.
    pub async fn execute(&mut self, code: &str) -> ExecResult {
        self.iteration_count += 1;

        if let Some(violation) = check_code_safety(code) {
            return self.failure("SafetyError", violation, String::new());
        }

        let program = match parser::parse(code) {
            Ok(program) => program,
            Err(message) => return self.failure("SyntaxError", message, String::new()),
        };

        let mut stdout = String::new();
        let outcome = {
            let mut interp = Interp {
                namespace: &mut self.namespace,
                host_fns: &self.host_fns,
                stdout: &mut stdout,
            };
            interp.exec_block(&program).await
        };

        match outcome {
            Ok(()) => ExecResult {
                stdout,
                stderr: String::new(),
                success: true,
                error_type: None,
                error_message: None,
                state: self.snapshot(),
            },
            Err(error) => self.failure(error.kind, error.message, stdout),
        }
    }

    /// Snapshot the visible namespace.
    pub fn snapshot(&self) -> Snapshot {
        let mut variables = BTreeMap::new();
        for (name, value) in &self.namespace {
            if name.starts_with('_') {
                continue;
            }
            let mut repr = value.to_string();
            if repr.chars().count() > MAX_REPR_LEN {
                repr = repr.chars().take(MAX_REPR_LEN).collect::<String>() + "...";
            }
            variables.insert(name.clone(), repr);
        }

        let final_value = self.namespace.get("FINAL").map(display_value);
        Snapshot {
            has_final: final_value.is_some(),
            final_value,
            variables,
            iteration_count: self.iteration_count,
        }
    }

    fn failure(
        &self,
        error_type: &str,
        message: impl Into<String>,
        stdout: String,
    ) -> ExecResult {
        let message = message.into();
        ExecResult {
            stdout,
            stderr: message.clone(),
            success: false,
            error_type: Some(error_type.to_string()),
            error_message: Some(message),
            state: self.snapshot(),
        }
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}

/// Blocked even though the language cannot express them; the rejection is
/// part of the sandbox contract and keeps the feedback to the model crisp.
const BLOCKED_CALLS: &[&str] = &["open(", "eval(", "exec(", "__import__("];

fn check_code_safety(code: &str) -> Option<String> {
    for line in code.lines() {
        let stripped = line.trim_start();
        if stripped.starts_with("import ") || stripped.starts_with("from ") {
            return Some(format!("Import statements are not allowed: {}", stripped.trim_end()));
        }
    }
    for blocked in BLOCKED_CALLS {
        if code.contains(blocked) {
            let name = blocked.trim_end_matches('(');
            return Some(format!("Blocked function call: {name}()"));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn namespace_persists_across_executions() {
        let mut sandbox = Sandbox::new();
        assert!(sandbox.execute("x = 2").await.success);
        let result = sandbox.execute("y = x * 21").await;
        assert!(result.success);
        assert_eq!(sandbox.get_variable("y"), Some(&json!(42)));
        assert_eq!(result.state.iteration_count, 2);
    }

    #[tokio::test]
    async fn print_output_is_captured() {
        let mut sandbox = Sandbox::new();
        let result = sandbox.execute("print(\"total:\", 1 + 2)").await;
        assert!(result.success);
        assert_eq!(result.stdout, "total: 3\n");
    }

    #[tokio::test]
    async fn final_assignment_is_reported() {
        let mut sandbox = Sandbox::new();
        let result = sandbox.execute("FINAL = \"done\"").await;
        assert!(result.state.has_final);
        assert_eq!(result.state.final_value.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn import_is_rejected_and_namespace_survives() {
        let mut sandbox = Sandbox::new().with_variable("P", json!("prompt"));
        let result = sandbox.execute("import os").await;
        assert!(!result.success);
        assert_eq!(result.error_type.as_deref(), Some("SafetyError"));
        assert!(result.error_message.as_deref().unwrap().contains("Import statements"));

        // Still usable afterwards.
        let result = sandbox.execute("x = len(P)").await;
        assert!(result.success);
        assert_eq!(sandbox.get_variable("x"), Some(&json!(6)));
    }

    #[tokio::test]
    async fn blocked_calls_are_rejected() {
        let mut sandbox = Sandbox::new();
        for code in ["open(\"f\")", "eval(\"x\")", "exec(\"x\")", "__import__(\"os\")"] {
            let result = sandbox.execute(code).await;
            assert!(!result.success, "{code} should be rejected");
            assert!(result.error_message.as_deref().unwrap().contains("Blocked function call"));
        }
    }

    #[tokio::test]
    async fn runtime_errors_keep_partial_effects() {
        let mut sandbox = Sandbox::new();
        let result = sandbox.execute("a = 1\nb = missing + 1").await;
        assert!(!result.success);
        assert_eq!(result.error_type.as_deref(), Some("NameError"));
        // The first assignment survived.
        assert_eq!(sandbox.get_variable("a"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn underscore_names_are_hidden_from_snapshots() {
        let mut sandbox = Sandbox::new();
        sandbox.execute("_scratch = 1\nvisible = 2").await;
        let snapshot = sandbox.snapshot();
        assert!(!snapshot.variables.contains_key("_scratch"));
        assert!(snapshot.variables.contains_key("visible"));
    }

    #[tokio::test]
    async fn long_reprs_are_truncated() {
        let mut sandbox = Sandbox::new();
        sandbox.execute("x = range(200)").await;
        let snapshot = sandbox.snapshot();
        let repr = &snapshot.variables["x"];
        assert!(repr.ends_with("..."));
        assert_eq!(repr.chars().count(), MAX_REPR_LEN + 3);
    }

    #[tokio::test]
    async fn control_flow_and_builtins() {
        let mut sandbox = Sandbox::new();
        let code = r#"
total = 0
for n in range(10) {
    if n % 2 == 0 {
        total = total + n
    }
}
words = split("a,b,c", ",")
summary = join(words, "-")
"#;
        let result = sandbox.execute(code).await;
        assert!(result.success, "{:?}", result.error_message);
        assert_eq!(sandbox.get_variable("total"), Some(&json!(20)));
        assert_eq!(sandbox.get_variable("summary"), Some(&json!("a-b-c")));
    }

    #[tokio::test]
    async fn maps_and_indexing() {
        let mut sandbox = Sandbox::new();
        let code = r#"
m = {"name": "run", "scores": [0.5, 0.9]}
best = max(m["scores"])
label = m["name"]
"#;
        let result = sandbox.execute(code).await;
        assert!(result.success, "{:?}", result.error_message);
        assert_eq!(sandbox.get_variable("best"), Some(&json!(0.9)));
        assert_eq!(sandbox.get_variable("label"), Some(&json!("run")));
    }

    #[tokio::test]
    async fn division_by_zero_is_a_value_error() {
        let mut sandbox = Sandbox::new();
        let result = sandbox.execute("x = 1 / 0").await;
        assert_eq!(result.error_type.as_deref(), Some("ValueError"));
        assert_eq!(result.error_message.as_deref(), Some("division by zero"));
    }

    #[tokio::test]
    async fn host_functions_are_callable_and_async() {
        let mut sandbox = Sandbox::new().with_host_fn(
            "double",
            host_fn(|args: Vec<Value>| async move {
                let n = args
                    .first()
                    .and_then(Value::as_i64)
                    .ok_or_else(|| "double() requires an integer".to_string())?;
                Ok(json!(n * 2))
            }),
        );
        let result = sandbox.execute("x = double(21)").await;
        assert!(result.success, "{:?}", result.error_message);
        assert_eq!(sandbox.get_variable("x"), Some(&json!(42)));
    }

    #[tokio::test]
    async fn host_errors_are_reported_not_fatal() {
        let mut sandbox = Sandbox::new().with_host_fn(
            "always_fails",
            host_fn(|_args| async move { Err("nope".to_string()) }),
        );
        let result = sandbox.execute("x = always_fails()").await;
        assert!(!result.success);
        assert_eq!(result.error_type.as_deref(), Some("HostError"));
        assert_eq!(result.error_message.as_deref(), Some("nope"));
        // Sandbox still works.
        assert!(sandbox.execute("y = 1").await.success);
    }

    #[tokio::test]
    async fn unknown_function_is_a_name_error() {
        let mut sandbox = Sandbox::new();
        let result = sandbox.execute("x = mystery(1)").await;
        assert_eq!(result.error_type.as_deref(), Some("NameError"));
    }

    #[tokio::test]
    async fn syntax_errors_are_captured() {
        let mut sandbox = Sandbox::new();
        let result = sandbox.execute("x = = 2").await;
        assert!(!result.success);
        assert_eq!(result.error_type.as_deref(), Some("SyntaxError"));
    }

    #[tokio::test]
    async fn negative_indexing_counts_from_the_end() {
        let mut sandbox = Sandbox::new();
        sandbox.execute("xs = [1, 2, 3]\nlast = xs[-1]").await;
        assert_eq!(sandbox.get_variable("last"), Some(&json!(3)));
    }

    #[tokio::test]
    async fn string_builtins() {
        let mut sandbox = Sandbox::new();
        let code = r#"
s = upper("run") + "-" + lower("OK")
flag = contains(s, "RUN")
"#;
        let result = sandbox.execute(code).await;
        assert!(result.success, "{:?}", result.error_message);
        assert_eq!(sandbox.get_variable("s"), Some(&json!("RUN-ok")));
        assert_eq!(sandbox.get_variable("flag"), Some(&json!(true)));
    }
}
