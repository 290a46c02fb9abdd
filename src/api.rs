use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Extension, Path, Query};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::RelayError;
use crate::pipeline::PipelineStep;
use crate::registry::catalog;
use crate::relay::Relay;

// ── Response types ───────────────────────────────────────────────

#[derive(Serialize)]
struct ApiOk<T: Serialize> {
    ok: bool,
    data: T,
}

#[derive(Serialize)]
struct ApiErr {
    ok: bool,
    error: RelayError,
}

fn ok_json<T: Serialize>(data: T) -> axum::response::Response {
    Json(ApiOk { ok: true, data }).into_response()
}

fn err_json(error: RelayError) -> axum::response::Response {
    (status_for(&error), Json(ApiErr { ok: false, error })).into_response()
}

fn status_for(error: &RelayError) -> StatusCode {
    match error {
        RelayError::NotFound { .. } => StatusCode::NOT_FOUND,
        RelayError::Validation { .. } | RelayError::Resolution { .. } => StatusCode::BAD_REQUEST,
        RelayError::Remote { .. } | RelayError::Channel { .. } => StatusCode::BAD_GATEWAY,
        RelayError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        RelayError::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn respond<T: Serialize>(result: Result<T, RelayError>) -> axum::response::Response {
    match result {
        Ok(data) => ok_json(data),
        Err(e) => err_json(e),
    }
}

// ── Request types ────────────────────────────────────────────────

#[derive(Deserialize)]
struct OperationsQuery {
    /// Comma-separated category names. Absent = every category.
    category: Option<String>,
}

#[derive(Deserialize)]
struct HelpQuery {
    topic: Option<String>,
}

#[derive(Deserialize)]
struct DescribeBody {
    names: Vec<String>,
}

#[derive(Deserialize)]
struct PipelineBody {
    steps: Vec<PipelineStep>,
}

// ── Handlers ─────────────────────────────────────────────────────

async fn get_health() -> impl IntoResponse {
    ok_json(serde_json::json!({ "status": "ok" }))
}

async fn get_categories(Extension(relay): Extension<Arc<Relay>>) -> impl IntoResponse {
    ok_json(relay.categories())
}

async fn get_operations(
    Extension(relay): Extension<Arc<Relay>>,
    Query(query): Query<OperationsQuery>,
) -> impl IntoResponse {
    let categories: Vec<String> = match query.category {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect(),
        None => relay.registry().categories(),
    };
    ok_json(relay.list_operations(&categories))
}

async fn post_describe(
    Extension(relay): Extension<Arc<Relay>>,
    Json(body): Json<DescribeBody>,
) -> impl IntoResponse {
    ok_json(relay.describe_operations(&body.names))
}

async fn get_help(
    Extension(relay): Extension<Arc<Relay>>,
    Query(query): Query<HelpQuery>,
) -> impl IntoResponse {
    ok_json(relay.help(query.topic.as_deref()))
}

async fn get_tools(Extension(relay): Extension<Arc<Relay>>) -> impl IntoResponse {
    ok_json(relay.tools())
}

async fn get_catalog(Extension(relay): Extension<Arc<Relay>>) -> impl IntoResponse {
    ok_json(catalog::to_json_schema(relay.registry()))
}

/// An empty body means no parameters; anything else must be JSON.
fn json_body(body: &Bytes) -> Result<Value, RelayError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body)
        .map_err(|e| RelayError::validation(format!("Request body is not valid JSON: {e}")))
}

async fn post_tool(
    Extension(relay): Extension<Arc<Relay>>,
    Path(name): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    respond(match json_body(&body) {
        Ok(args) => relay.call_tool(&name, args).await,
        Err(e) => Err(e),
    })
}

async fn post_invoke(
    Extension(relay): Extension<Arc<Relay>>,
    Path(operation): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    respond(match json_body(&body) {
        Ok(params) => relay.invoke(&operation, params).await,
        Err(e) => Err(e),
    })
}

/// Partial failure is still a 200: the report says which step halted the run.
async fn post_pipeline(
    Extension(relay): Extension<Arc<Relay>>,
    Json(body): Json<PipelineBody>,
) -> impl IntoResponse {
    respond(relay.run_pipeline(body.steps).await)
}

async fn post_activate(
    Extension(relay): Extension<Arc<Relay>>,
    Path(category): Path<String>,
) -> impl IntoResponse {
    respond(relay.activate_category(&category))
}

// ── Server startup ───────────────────────────────────────────────

pub fn router(relay: Arc<Relay>) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/api/categories", get(get_categories))
        .route("/api/categories/{category}/activate", post(post_activate))
        .route("/api/operations", get(get_operations))
        .route("/api/operations/describe", post(post_describe))
        .route("/api/catalog", get(get_catalog))
        .route("/api/help", get(get_help))
        .route("/api/tools", get(get_tools))
        .route("/api/tools/{name}", post(post_tool))
        .route("/api/invoke/{operation}", post(post_invoke))
        .route("/api/pipeline", post(post_pipeline))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(Extension(relay))
}

/// Start the HTTP API on `127.0.0.1:port` (0 = OS-assigned). Returns the bound port.
pub async fn start_api_server(relay: Arc<Relay>, port: u16) -> Result<u16, RelayError> {
    let app = router(relay);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| RelayError::config(format!("Failed to bind API server: {e}")))?;
    let port = listener
        .local_addr()
        .map_err(|e| RelayError::config(format!("Failed to get API server port: {e}")))?
        .port();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "API server stopped");
        }
    });

    tracing::info!(port, "API server listening");
    Ok(port)
}
