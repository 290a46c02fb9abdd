use serde_json::{json, Value};

use super::{OperationDescriptor, OperationRegistry};

/// The fixed tool list handed to an agent.
///
/// Dumping every operation schema up front blows past token limits, so agents
/// get four meta-tools instead: `help` to discover, `run` for one call,
/// `pipeline` for chained calls and `activate_category` to promote a category
/// to directly callable tools.
pub fn llm_tools() -> Value {
    json!([
        {
            "name": "help",
            "description": "Discover available operations. No args = list categories. Provide a category name to see its operations, or an operation name to see its full parameter schema.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "topic": {
                        "type": "string",
                        "description": "Category name (e.g. 'shape') or operation name (e.g. 'create_cube')"
                    }
                }
            }
        },
        {
            "name": "run",
            "description": "Execute a single operation. Use help() first to discover operation names and parameters.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "operation": { "type": "string", "description": "Operation name (e.g. 'create_cube')" },
                    "params": { "type": "object", "description": "Operation parameters (see help for schema)" }
                },
                "required": ["operation"]
            }
        },
        {
            "name": "pipeline",
            "description": "Execute operations in order, stopping at the first failure. A step's mappedParams may reference earlier results with \"$.<stepId>.<field>[index]\"; mapped values override staticParams.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "steps": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "id": { "type": "string", "description": "Label for referencing this step's result (defaults to its position)" },
                                "operationName": { "type": "string" },
                                "staticParams": { "type": "object" },
                                "mappedParams": { "type": "object" }
                            },
                            "required": ["operationName"]
                        }
                    }
                },
                "required": ["steps"]
            }
        },
        {
            "name": "activate_category",
            "description": "Make every operation in a category callable directly as its own tool.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "category": { "type": "string", "description": "Category name (e.g. 'object')" }
                },
                "required": ["category"]
            }
        }
    ])
}

/// Names of the meta-tools returned by [`llm_tools`].
pub const META_TOOLS: &[&str] = &["help", "run", "pipeline", "activate_category"];

fn tool_entry(descriptor: &OperationDescriptor) -> Value {
    json!({
        "name": descriptor.name,
        "description": descriptor.description,
        "input_schema": descriptor.params.json_schema,
    })
}

/// Tool entries for operations whose category has been activated.
pub fn native_tools(registry: &OperationRegistry) -> Value {
    Value::Array(
        registry
            .active_operations()
            .iter()
            .map(|d| tool_entry(d))
            .collect(),
    )
}

/// Help text for agent discovery.
/// Three tiers: no topic → categories, category → operation list, operation → full schema.
pub fn help_text(registry: &OperationRegistry, topic: Option<&str>) -> String {
    let topic = topic.map(str::trim).filter(|t| !t.is_empty());
    match topic {
        None => {
            let mut lines = vec!["Available operation categories:".to_string()];
            for info in registry.category_infos() {
                if info.description.is_empty() {
                    lines.push(format!("  {} ({})", info.name, info.operation_count));
                } else {
                    lines.push(format!(
                        "  {} ({}): {}",
                        info.name, info.operation_count, info.description
                    ));
                }
            }
            lines.push(String::new());
            lines.push("Use help({topic: \"shape\"}) to list operations in a category.".to_string());
            lines.push("Use help({topic: \"create_cube\"}) for full parameter details.".to_string());
            lines.join("\n")
        }
        Some(topic) => {
            if let Some(descriptor) = registry.get(topic) {
                let schema = serde_json::to_string_pretty(&descriptor.params.json_schema)
                    .unwrap_or_else(|_| "{}".to_string());
                return format!(
                    "{}: {}\nCategory: {}\n\nParameters:\n{}",
                    descriptor.name, descriptor.description, descriptor.category, schema
                );
            }

            let operations = registry.list_by_category(topic);
            if operations.is_empty() {
                return format!(
                    "Unknown topic: \"{topic}\". Known categories: {}. Use help() for an overview.",
                    registry.categories().join(", ")
                );
            }

            let mut lines = vec![format!("{} operations:", topic.to_lowercase())];
            for d in &operations {
                let marker = if registry.is_active(&d.name) { " [active]" } else { "" };
                lines.push(format!("  - {}: {}{marker}", d.name, d.description));
            }
            lines.push(String::new());
            lines.push("Use help({topic: \"operation_name\"}) for parameter details.".to_string());
            lines.join("\n")
        }
    }
}

/// Full catalog as a JSON array (for REST clients and `--json` output).
pub fn to_json_schema(registry: &OperationRegistry) -> Value {
    let categories = registry.categories();
    Value::Array(
        categories
            .iter()
            .flat_map(|c| registry.list_by_category(c))
            .map(|d| {
                json!({
                    "name": d.name,
                    "description": d.description,
                    "category": d.category,
                    "inputSchema": d.params.json_schema,
                })
            })
            .collect(),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_tools_are_the_meta_tools() {
        let tools = llm_tools();
        let names: Vec<&str> = tools
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, META_TOOLS);
    }

    #[test]
    fn test_help_tiers() {
        let registry = OperationRegistry::with_builtin_operations();

        let overview = help_text(&registry, None);
        assert!(overview.contains("shape ("));
        assert!(overview.contains("animation ("));

        let category = help_text(&registry, Some("Shape"));
        assert!(category.starts_with("shape operations:"));
        assert!(category.contains("create_cube"));

        let operation = help_text(&registry, Some("rename"));
        assert!(operation.starts_with("rename:"));
        assert!(operation.contains("targetId"));

        let unknown = help_text(&registry, Some("teleport"));
        assert!(unknown.contains("Unknown topic"));
        assert!(unknown.contains("object"));
    }

    #[test]
    fn test_native_tools_follow_activation() {
        let registry = OperationRegistry::with_builtin_operations();
        assert_eq!(native_tools(&registry), json!([]));

        registry.activate_category("shape").unwrap();
        let tools = native_tools(&registry);
        let tools = tools.as_array().unwrap();
        assert_eq!(tools.len(), registry.list_by_category("shape").len());
        assert!(tools.iter().all(|t| t["input_schema"].is_object()));
    }

    #[test]
    fn test_json_export_covers_every_operation() {
        let registry = OperationRegistry::with_builtin_operations();
        let export = to_json_schema(&registry);
        assert_eq!(export.as_array().unwrap().len(), registry.len());
    }
}
