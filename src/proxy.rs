use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::RelayError;
use crate::registry::{OperationDescriptor, OperationRegistry};
use crate::remote::RemoteClient;

/// On-demand entry point for any cataloged operation.
///
/// Lookup and schema validation happen locally, so an unknown name or a
/// malformed parameter object never costs a round trip. Nothing is cached
/// or retried: every call is a fresh call against live host state.
pub struct InvocationProxy {
    registry: Arc<OperationRegistry>,
    client: RemoteClient,
}

impl InvocationProxy {
    pub fn new(registry: Arc<OperationRegistry>, client: RemoteClient) -> Self {
        Self { registry, client }
    }

    pub fn registry(&self) -> &Arc<OperationRegistry> {
        &self.registry
    }

    pub fn client(&self) -> &RemoteClient {
        &self.client
    }

    /// Look up `operation` and validate `params` against its schema, returning
    /// the descriptor and the exact arguments that would be sent.
    pub fn prepare(
        &self,
        operation: &str,
        params: &Value,
    ) -> Result<(Arc<OperationDescriptor>, Map<String, Value>), RelayError> {
        let descriptor = self
            .registry
            .get(operation)
            .ok_or_else(|| self.registry.not_found(format!("Operation '{operation}'")))?;
        let args = descriptor.params.validate(&descriptor.name, params)?;
        Ok((descriptor, args))
    }

    pub async fn invoke(&self, operation: &str, params: Value) -> Result<Value, RelayError> {
        let (descriptor, args) = self.prepare(operation, &params).inspect_err(|e| {
            tracing::info!(operation, error = %e, "invocation rejected locally");
        })?;
        self.client.send(&descriptor.name, Value::Object(args)).await
    }
}
