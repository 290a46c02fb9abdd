//! The relay facade: one object wiring the registry, the invocation proxy and
//! the pipeline runner, plus dispatch of agent tool calls onto them.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::audit::AuditLog;
use crate::error::RelayError;
use crate::pipeline::{PipelineRunReport, PipelineRunner, PipelineStep};
use crate::proxy::InvocationProxy;
use crate::registry::catalog;
use crate::registry::{
    Activation, CategoryInfo, OperationDescriptor, OperationRegistry, OperationSummary,
};
use crate::remote::RemoteClient;
use crate::settings::RelaySettings;

/// Full-schema view for a set of names; unknown names are listed, not fatal.
#[derive(Debug, Clone, Serialize)]
pub struct OperationDescriptions {
    pub operations: Vec<Arc<OperationDescriptor>>,
    pub missing: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RunInput {
    #[serde(alias = "command")]
    operation: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Deserialize)]
struct PipelineInput {
    steps: Vec<PipelineStep>,
}

#[derive(Debug, Deserialize)]
struct ActivateInput {
    category: String,
}

fn parse_input<T: serde::de::DeserializeOwned>(tool: &str, input: Value) -> Result<T, RelayError> {
    let input = if input.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        input
    };
    serde_json::from_value(input)
        .map_err(|e| RelayError::validation(format!("Invalid input for '{tool}': {e}")))
}

fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_default()
}

pub struct Relay {
    registry: Arc<OperationRegistry>,
    proxy: Arc<InvocationProxy>,
    runner: PipelineRunner,
}

impl Relay {
    pub fn new(registry: Arc<OperationRegistry>, client: RemoteClient, max_steps: usize) -> Self {
        let proxy = Arc::new(InvocationProxy::new(registry.clone(), client));
        let runner = PipelineRunner::new(proxy.clone()).with_max_steps(max_steps);
        Self {
            registry,
            proxy,
            runner,
        }
    }

    /// Built-in operations talking HTTP to `settings.host_url`. Audit lines go
    /// under `config_dir` when auditing is enabled.
    pub fn from_settings(settings: &RelaySettings, config_dir: &Path) -> Self {
        let mut client = RemoteClient::http(settings.host_url.clone(), settings.timeout());
        if settings.audit {
            client = client.with_audit(AuditLog::new(crate::paths::audit_dir(config_dir)));
        }
        let registry = Arc::new(OperationRegistry::with_builtin_operations());
        tracing::info!(
            host = %settings.host_url,
            timeout_secs = settings.timeout_secs,
            operations = registry.len(),
            "relay ready"
        );
        Self::new(registry, client, settings.max_pipeline_steps)
    }

    pub fn registry(&self) -> &Arc<OperationRegistry> {
        &self.registry
    }

    pub fn proxy(&self) -> &Arc<InvocationProxy> {
        &self.proxy
    }

    // ── Catalog queries ──────────────────────────────────────────

    pub fn categories(&self) -> Vec<CategoryInfo> {
        self.registry.category_infos()
    }

    pub fn list_operations(&self, categories: &[String]) -> Vec<OperationSummary> {
        self.registry.list_operations(categories)
    }

    pub fn describe_operations(&self, names: &[String]) -> OperationDescriptions {
        let (operations, missing) = self.registry.describe_operations(names);
        OperationDescriptions {
            operations,
            missing,
        }
    }

    pub fn help(&self, topic: Option<&str>) -> String {
        catalog::help_text(&self.registry, topic)
    }

    pub fn activate_category(&self, category: &str) -> Result<Activation, RelayError> {
        self.registry.activate_category(category)
    }

    /// Meta-tools followed by every activated operation as a native tool.
    pub fn tools(&self) -> Value {
        let mut tools = match catalog::llm_tools() {
            Value::Array(tools) => tools,
            _ => Vec::new(),
        };
        if let Value::Array(native) = catalog::native_tools(&self.registry) {
            tools.extend(native);
        }
        Value::Array(tools)
    }

    // ── Execution ────────────────────────────────────────────────

    pub async fn invoke(&self, operation: &str, params: Value) -> Result<Value, RelayError> {
        self.proxy.invoke(operation, params).await
    }

    pub async fn run_pipeline(&self, steps: Vec<PipelineStep>) -> Result<PipelineRunReport, RelayError> {
        self.runner.run(steps).await
    }

    /// Execute one agent tool call: a meta-tool, or an operation from an
    /// activated category called natively with its params as the input.
    pub async fn call_tool(&self, name: &str, input: Value) -> Result<Value, RelayError> {
        tracing::debug!(tool = name, "tool call");
        match name {
            "help" => {
                let topic = input.get("topic").and_then(Value::as_str);
                Ok(Value::String(self.help(topic)))
            }
            "run" => {
                let RunInput { operation, params } = parse_input(name, input)?;
                self.invoke(&operation, params).await
            }
            "pipeline" => {
                let PipelineInput { steps } = parse_input(name, input)?;
                self.run_pipeline(steps).await.map(|report| to_json(&report))
            }
            "activate_category" => {
                let ActivateInput { category } = parse_input(name, input)?;
                self.activate_category(&category).map(|a| to_json(&a))
            }
            operation if self.registry.is_active(operation) => self.invoke(operation, input).await,
            operation => match self.registry.get(operation) {
                Some(descriptor) => Err(RelayError::validation(format!(
                    "'{operation}' is not an active tool. Call activate_category({{\"category\": \"{}\"}}) first, or use run.",
                    descriptor.category
                ))),
                None => Err(self.registry.not_found(format!("Tool '{operation}'"))),
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing, clippy::panic)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::ErrorKind;
    use crate::remote::mock::ScriptedTransport;
    use serde_json::json;

    fn relay(transport: ScriptedTransport) -> (Relay, Arc<ScriptedTransport>) {
        let transport = Arc::new(transport);
        let client = RemoteClient::new(transport.clone(), Duration::from_millis(200));
        let registry = Arc::new(OperationRegistry::with_builtin_operations());
        (Relay::new(registry, client, 20), transport)
    }

    #[tokio::test]
    async fn test_help_and_run_tools() {
        let (relay, transport) =
            relay(ScriptedTransport::new().with_result("create_cube", json!({ "id": 1 })));

        let help = relay.call_tool("help", json!({})).await.unwrap();
        assert!(help.as_str().unwrap().contains("shape"));

        let result = relay
            .call_tool("run", json!({ "operation": "create_cube", "params": { "size": 3 } }))
            .await
            .unwrap();
        assert_eq!(result, json!({ "id": 1 }));
        assert_eq!(transport.commands(), vec!["create_cube"]);
    }

    #[tokio::test]
    async fn test_pipeline_tool_returns_report() {
        let (relay, _) = relay(
            ScriptedTransport::new()
                .with_result("create_cube", json!({ "id": 42 }))
                .with_result("rename", json!({ "ok": true })),
        );
        let report = relay
            .call_tool(
                "pipeline",
                json!({ "steps": [
                    { "id": "c", "operationName": "create_cube", "staticParams": { "size": 2 } },
                    { "id": "r", "operationName": "rename", "mappedParams": { "targetId": "$.c.id", "newName": "Box" } }
                ] }),
            )
            .await
            .unwrap();
        assert_eq!(report["completedSteps"], 2);
        assert_eq!(report["success"], true);
    }

    #[tokio::test]
    async fn test_malformed_tool_input_is_validation_error() {
        let (relay, _) = relay(ScriptedTransport::new());
        let err = relay.call_tool("run", json!({ "params": {} })).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        let err = relay.call_tool("pipeline", Value::Null).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
    }

    #[tokio::test]
    async fn test_native_call_requires_activation() {
        let (relay, transport) =
            relay(ScriptedTransport::new().with_result("delete_object", json!({ "deleted": 4 })));

        let err = relay
            .call_tool("delete_object", json!({ "targetId": 4 }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("activate_category"));
        assert!(transport.requests().is_empty());

        let activation = relay
            .call_tool("activate_category", json!({ "category": "object" }))
            .await
            .unwrap();
        assert_eq!(activation["category"], "object");
        assert!(activation["newly_activated"]
            .as_array()
            .unwrap()
            .contains(&json!("delete_object")));

        let result = relay
            .call_tool("delete_object", json!({ "targetId": 4 }))
            .await
            .unwrap();
        assert_eq!(result, json!({ "deleted": 4 }));

        let names: Vec<String> = relay
            .tools()
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap().to_string())
            .collect();
        assert!(names.contains(&"run".to_string()));
        assert!(names.contains(&"delete_object".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_not_found() {
        let (relay, _) = relay(ScriptedTransport::new());
        let err = relay.call_tool("teleport", json!({})).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_describe_reports_missing_names() {
        let (relay, _) = relay(ScriptedTransport::new());
        let described = relay.describe_operations(&["rename".into(), "nope".into()]);
        assert_eq!(described.operations.len(), 1);
        assert_eq!(described.missing, vec!["nope"]);

        let json = to_json(&described);
        assert_eq!(json["operations"][0]["name"], "rename");
        assert!(json["operations"][0]["params"]["json_schema"].is_object());
    }
}
