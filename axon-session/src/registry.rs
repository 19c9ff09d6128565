//! Domain packs — declarative bundles of tools, roles, and workflows.
//!
//! A pack declares its tools as factory closures registered at
//! construction, so the orchestrator can instantiate a fresh registry per
//! agent without any dynamic loading.

use axon0::side_effect::SideEffect;
use axon_governance::budget::BudgetSpec;
use axon_tool::Tool;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Builds a tool instance on demand.
pub type ToolFactory = Arc<dyn Fn() -> Arc<dyn Tool> + Send + Sync>;

/// A tool available in a domain pack.
#[derive(Clone)]
pub struct ToolManifestEntry {
    /// Tool name as it will appear in registries.
    pub name: String,
    /// What the tool does.
    pub description: String,
    /// The tool's side-effect class, for policy authoring.
    pub side_effect: SideEffect,
    factory: ToolFactory,
}

impl ToolManifestEntry {
    /// Declare a tool with its factory.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        side_effect: SideEffect,
        factory: ToolFactory,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            side_effect,
            factory,
        }
    }

    /// Instantiate the tool.
    pub fn build(&self) -> Arc<dyn Tool> {
        (self.factory)()
    }
}

impl fmt::Debug for ToolManifestEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolManifestEntry")
            .field("name", &self.name)
            .field("side_effect", &self.side_effect)
            .finish()
    }
}

/// A reusable agent role within a pack.
#[derive(Debug, Clone)]
pub struct RoleTemplate {
    /// Role identifier.
    pub name: String,
    /// Human-readable name, used for task names.
    pub display_name: String,
    /// What an agent in this role is asked to do.
    pub description: String,
    /// The role's base system prompt.
    pub system_prompt: String,
    /// Names of pack tools this role may use.
    pub tool_names: Vec<String>,
    /// Default budget for agents in this role.
    pub budget_profile: BudgetSpec,
    /// Step limit for agents in this role.
    pub max_steps: u32,
}

/// A workflow available in a domain pack.
#[derive(Debug, Clone)]
pub struct WorkflowManifestEntry {
    /// Workflow identifier.
    pub name: String,
    /// What the workflow does.
    pub description: String,
    /// Role names the workflow is built from by default.
    pub default_roles: Vec<String>,
}

/// A domain pack's full declaration.
#[derive(Debug, Clone)]
pub struct DomainPackManifest {
    /// Unique pack identifier.
    pub name: String,
    /// Human-readable name.
    pub display_name: String,
    /// What the pack provides.
    pub description: String,
    /// Semantic version string.
    pub version: String,
    /// Declared tools.
    pub tools: Vec<ToolManifestEntry>,
    /// Declared roles.
    pub role_templates: Vec<RoleTemplate>,
    /// Declared workflows.
    pub workflows: Vec<WorkflowManifestEntry>,
}

impl DomainPackManifest {
    /// Look up a role by name.
    pub fn role(&self, name: &str) -> Option<&RoleTemplate> {
        self.role_templates.iter().find(|r| r.name == name)
    }

    /// Look up a workflow by name.
    pub fn workflow(&self, name: &str) -> Option<&WorkflowManifestEntry> {
        self.workflows.iter().find(|w| w.name == name)
    }

    /// Look up a tool entry by name.
    pub fn tool(&self, name: &str) -> Option<&ToolManifestEntry> {
        self.tools.iter().find(|t| t.name == name)
    }
}

/// Errors from pack registration and lookup.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A pack with this name is already registered.
    #[error("domain pack '{0}' is already registered")]
    DuplicatePack(String),

    /// No pack with this name is registered.
    #[error("domain pack '{0}' is not registered")]
    UnknownPack(String),

    /// The pack has no role with this name.
    #[error("role '{role}' not found in domain pack '{pack}'")]
    UnknownRole {
        /// The pack that was searched.
        pack: String,
        /// The missing role.
        role: String,
    },
}

/// Registry of domain packs, read-only after construction time.
#[derive(Default)]
pub struct DomainRegistry {
    packs: HashMap<String, DomainPackManifest>,
}

impl DomainRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pack. Names must be unique.
    pub fn register(&mut self, manifest: DomainPackManifest) -> Result<(), RegistryError> {
        if self.packs.contains_key(&manifest.name) {
            return Err(RegistryError::DuplicatePack(manifest.name));
        }
        self.packs.insert(manifest.name.clone(), manifest);
        Ok(())
    }

    /// All registered packs, sorted by name.
    pub fn list_packs(&self) -> Vec<&DomainPackManifest> {
        let mut packs: Vec<&DomainPackManifest> = self.packs.values().collect();
        packs.sort_by(|a, b| a.name.cmp(&b.name));
        packs
    }

    /// Look up a pack.
    pub fn get_pack(&self, name: &str) -> Result<&DomainPackManifest, RegistryError> {
        self.packs
            .get(name)
            .ok_or_else(|| RegistryError::UnknownPack(name.to_string()))
    }

    /// Whether a pack is registered.
    pub fn has_pack(&self, name: &str) -> bool {
        self.packs.contains_key(name)
    }

    /// Look up a role in a pack.
    pub fn get_role_template(&self, pack: &str, role: &str) -> Result<&RoleTemplate, RegistryError> {
        self.get_pack(pack)?
            .role(role)
            .ok_or_else(|| RegistryError::UnknownRole {
                pack: pack.to_string(),
                role: role.to_string(),
            })
    }

    /// Number of registered packs.
    pub fn len(&self) -> usize {
        self.packs.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.packs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axon_tool::ToolError;
    use serde_json::{Value, json};
    use std::future::Future;
    use std::pin::Pin;

    struct NoopTool;

    impl Tool for NoopTool {
        fn name(&self) -> &str {
            "noop"
        }
        fn description(&self) -> &str {
            "does nothing"
        }
        fn side_effect(&self) -> SideEffect {
            SideEffect::Pure
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }
        fn output_schema(&self) -> Value {
            json!({"type": "object"})
        }
        fn call(
            &self,
            _input: Value,
        ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + '_>> {
            Box::pin(async { Ok(json!({})) })
        }
    }

    fn sample_pack(name: &str) -> DomainPackManifest {
        DomainPackManifest {
            name: name.to_string(),
            display_name: "Sample".into(),
            description: "sample pack".into(),
            version: "0.1.0".into(),
            tools: vec![ToolManifestEntry::new(
                "noop",
                "does nothing",
                SideEffect::Pure,
                Arc::new(|| Arc::new(NoopTool)),
            )],
            role_templates: vec![RoleTemplate {
                name: "worker".into(),
                display_name: "Worker".into(),
                description: "do the work".into(),
                system_prompt: "You are a worker.".into(),
                tool_names: vec!["noop".into()],
                budget_profile: BudgetSpec::default(),
                max_steps: 5,
            }],
            workflows: vec![WorkflowManifestEntry {
                name: "solo".into(),
                description: "one worker".into(),
                default_roles: vec!["worker".into()],
            }],
        }
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = DomainRegistry::new();
        registry.register(sample_pack("alpha")).unwrap();
        assert!(registry.has_pack("alpha"));
        assert_eq!(registry.len(), 1);
        assert!(registry.get_pack("alpha").is_ok());
        assert!(matches!(
            registry.get_pack("ghost"),
            Err(RegistryError::UnknownPack(_))
        ));
    }

    #[test]
    fn duplicate_pack_is_rejected() {
        let mut registry = DomainRegistry::new();
        registry.register(sample_pack("alpha")).unwrap();
        assert!(matches!(
            registry.register(sample_pack("alpha")),
            Err(RegistryError::DuplicatePack(_))
        ));
    }

    #[test]
    fn role_lookup() {
        let mut registry = DomainRegistry::new();
        registry.register(sample_pack("alpha")).unwrap();
        let role = registry.get_role_template("alpha", "worker").unwrap();
        assert_eq!(role.max_steps, 5);
        assert!(matches!(
            registry.get_role_template("alpha", "boss"),
            Err(RegistryError::UnknownRole { .. })
        ));
    }

    #[test]
    fn tool_factories_build_instances() {
        let pack = sample_pack("alpha");
        let tool = pack.tool("noop").unwrap().build();
        assert_eq!(tool.name(), "noop");
    }

    #[test]
    fn packs_list_sorted() {
        let mut registry = DomainRegistry::new();
        registry.register(sample_pack("zeta")).unwrap();
        registry.register(sample_pack("alpha")).unwrap();
        let names: Vec<&str> = registry.list_packs().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
