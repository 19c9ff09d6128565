//! Rendering the tool registry into the agent's system prompt.

use axon_tool::ToolRegistry;

/// Render every registered tool as a Markdown block, sorted by name.
pub fn build_tool_descriptions(registry: &ToolRegistry, include_schemas: bool) -> String {
    let mut blocks = Vec::new();
    for name in registry.names() {
        let Some(tool) = registry.get(&name) else {
            continue;
        };
        let mut block = format!(
            "## {} (v{}, {})\n{}",
            tool.name(),
            tool.version(),
            tool.side_effect().as_str(),
            tool.description(),
        );
        if include_schemas {
            block.push_str(&format!("\nInput schema: {}", tool.input_schema()));
        }
        blocks.push(block);
    }
    if blocks.is_empty() {
        "(no tools registered)".to_string()
    } else {
        blocks.join("\n\n")
    }
}
