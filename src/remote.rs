//! Request/response exchange with the editor host.
//!
//! Every call is one [`HostRequest`] carrying a fresh correlation id and one
//! matching [`HostResponse`]. How the envelope travels is the [`Transport`]'s
//! business; [`RemoteClient`] owns the timeout, the correlation check and the
//! mapping of failures onto [`RelayError`]. There are no retries at this layer:
//! host operations are not idempotent.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::audit::AuditLog;
use crate::error::RelayError;

// ── Wire envelope ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostRequest {
    pub id: String,
    pub command: String,
    pub params: Value,
}

impl HostRequest {
    fn new(command: &str, params: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            command: command.to_string(),
            params,
        }
    }
}

fn unknown_kind() -> String {
    "unknown".to_string()
}

/// Failure reported by the host after it tried to run the operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostError {
    #[serde(default = "unknown_kind")]
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostResponse {
    pub id: String,
    /// Absent `ok` is inferred from the presence of `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<HostError>,
}

impl HostResponse {
    pub fn success(id: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            ok: Some(true),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: impl Into<String>, kind: &str, message: &str) -> Self {
        Self {
            id: id.into(),
            ok: Some(false),
            result: None,
            error: Some(HostError {
                kind: kind.to_string(),
                message: message.to_string(),
            }),
        }
    }

    fn is_ok(&self) -> bool {
        self.ok.unwrap_or(self.error.is_none())
    }
}

// ── Transport ────────────────────────────────────────────────────

/// Carries one request to the host and returns its response. Implementations
/// report delivery problems as [`RelayError::Channel`]; they must not retry.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn exchange(&self, request: &HostRequest) -> Result<HostResponse, RelayError>;
}

/// POSTs the request envelope as JSON to the host's command endpoint.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn exchange(&self, request: &HostRequest) -> Result<HostResponse, RelayError> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| RelayError::channel(format!("Failed to reach host at {}: {e}", self.url)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(RelayError::channel(format!("Host returned HTTP {status}: {text}")));
        }

        response
            .json::<HostResponse>()
            .await
            .map_err(|e| RelayError::channel(format!("Malformed host response: {e}")))
    }
}

// ── Client ───────────────────────────────────────────────────────

pub struct RemoteClient {
    transport: Arc<dyn Transport>,
    timeout: Duration,
    audit: Option<AuditLog>,
}

impl RemoteClient {
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self {
            transport,
            timeout,
            audit: None,
        }
    }

    pub fn http(url: impl Into<String>, timeout: Duration) -> Self {
        Self::new(Arc::new(HttpTransport::new(url)), timeout)
    }

    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send one operation to the host and wait for its matching response.
    pub async fn send(&self, operation: &str, params: Value) -> Result<Value, RelayError> {
        let request = HostRequest::new(operation, params);
        let started = Instant::now();
        tracing::debug!(operation, request_id = %request.id, "dispatching to host");

        let outcome = match tokio::time::timeout(self.timeout, self.transport.exchange(&request)).await {
            Err(_) => Err(RelayError::Timeout {
                operation: operation.to_string(),
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            Ok(Err(e)) => Err(e),
            Ok(Ok(response)) => unpack(&request, response),
        };

        let elapsed = started.elapsed();
        match &outcome {
            Ok(_) => tracing::debug!(
                operation,
                request_id = %request.id,
                elapsed_ms = elapsed.as_millis(),
                "host call succeeded"
            ),
            Err(e) => tracing::warn!(
                operation,
                request_id = %request.id,
                elapsed_ms = elapsed.as_millis(),
                error = %e,
                "host call failed"
            ),
        }

        if let Some(audit) = &self.audit {
            let message = outcome.as_ref().err().map(ToString::to_string);
            audit.log_invocation(
                &request.id,
                operation,
                &request.params,
                message.as_deref().map_or(Ok(()), Err),
                elapsed,
            );
        }

        outcome
    }
}

fn unpack(request: &HostRequest, response: HostResponse) -> Result<Value, RelayError> {
    if response.id != request.id {
        return Err(RelayError::channel(format!(
            "Correlation mismatch: sent request {} but received response for {}",
            request.id, response.id
        )));
    }
    if response.is_ok() {
        return Ok(response.result.unwrap_or(Value::Null));
    }
    Err(match response.error {
        Some(e) => RelayError::Remote {
            kind: e.kind,
            message: e.message,
        },
        None => RelayError::Remote {
            kind: unknown_kind(),
            message: format!("Host reported failure for '{}' without details", request.command),
        },
    })
}

// ── Test transport ───────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod mock {
    use std::collections::HashMap;

    use parking_lot::Mutex;

    use super::*;

    /// Canned behaviour for one command.
    #[derive(Clone)]
    pub enum Scripted {
        Result(Value),
        HostError { kind: String, message: String },
        Hang,
        Disconnect,
        WrongId,
    }

    /// In-memory host: replays canned responses per command and records every
    /// request it receives.
    #[derive(Default)]
    pub struct ScriptedTransport {
        responses: Mutex<HashMap<String, Scripted>>,
        requests: Mutex<Vec<HostRequest>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(self, command: &str, behaviour: Scripted) -> Self {
            self.responses.lock().insert(command.to_string(), behaviour);
            self
        }

        pub fn with_result(self, command: &str, result: Value) -> Self {
            self.with(command, Scripted::Result(result))
        }

        pub fn with_host_error(self, command: &str, kind: &str, message: &str) -> Self {
            self.with(
                command,
                Scripted::HostError {
                    kind: kind.to_string(),
                    message: message.to_string(),
                },
            )
        }

        pub fn requests(&self) -> Vec<HostRequest> {
            self.requests.lock().clone()
        }

        pub fn commands(&self) -> Vec<String> {
            self.requests.lock().iter().map(|r| r.command.clone()).collect()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn exchange(&self, request: &HostRequest) -> Result<HostResponse, RelayError> {
            self.requests.lock().push(request.clone());
            let behaviour = self.responses.lock().get(&request.command).cloned();
            match behaviour {
                Some(Scripted::Result(v)) => Ok(HostResponse::success(&request.id, v)),
                Some(Scripted::HostError { kind, message }) => {
                    Ok(HostResponse::failure(&request.id, &kind, &message))
                }
                Some(Scripted::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(RelayError::channel("hung request finished"))
                }
                Some(Scripted::Disconnect) => Err(RelayError::channel("host disconnected")),
                Some(Scripted::WrongId) => Ok(HostResponse::success("someone-else", Value::Null)),
                None => Ok(HostResponse::failure(
                    &request.id,
                    "unknown_command",
                    &format!("Unknown command: {}", request.command),
                )),
            }
        }
    }
}
