//! MCP HTTP Server
//!
//! JSON-RPC 2.0 over HTTP POST on a single path. Every other path is 404 and
//! any other method on the MCP path is 405. Notifications get `202 Accepted`
//! with no body.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::protocol::{
    is_notification, InitializeResult, McpError, McpMethod, McpRequest, McpResponse, RequestId,
    ServerInfo, ToolCallParams, JSONRPC_VERSION, PROTOCOL_VERSION,
};
use super::tool;
use crate::metrics;
use crate::pipeline::Orchestrator;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
}

/// Build the MCP router
pub fn router(orchestrator: Arc<Orchestrator>, mcp_path: &str) -> Router {
    Router::new()
        .route(mcp_path, post(rpc_handler))
        .fallback(not_found)
        .with_state(AppState { orchestrator })
        .layer(TraceLayer::new_for_http())
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}

async fn rpc_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let value: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("Unparseable JSON-RPC body: {}", e);
            return Json(McpResponse::err(None, McpError::parse_error(e.to_string())))
                .into_response();
        }
    };

    match value {
        Value::Array(batch) => {
            if batch.is_empty() {
                return Json(McpResponse::err(
                    None,
                    McpError::invalid_request("Empty batch"),
                ))
                .into_response();
            }

            let mut responses = Vec::new();
            for message in batch {
                if let Some(response) = handle_message(&state, message).await {
                    responses.push(response);
                }
            }

            if responses.is_empty() {
                StatusCode::ACCEPTED.into_response()
            } else {
                Json(responses).into_response()
            }
        }
        message => match handle_message(&state, message).await {
            Some(response) => Json(response).into_response(),
            None => StatusCode::ACCEPTED.into_response(),
        },
    }
}

/// Handle one message; `None` for notifications
async fn handle_message(state: &AppState, message: Value) -> Option<McpResponse> {
    let notification = is_notification(&message);
    let request: McpRequest = match serde_json::from_value(message.clone()) {
        Ok(r) => r,
        Err(e) => {
            let id = message
                .get("id")
                .and_then(|id| serde_json::from_value::<RequestId>(id.clone()).ok());
            return Some(McpResponse::err(
                id,
                McpError::invalid_request(format!("Invalid request: {}", e)),
            ));
        }
    };

    let method = McpMethod::from(request.method.as_str());
    metrics::RPC_REQUESTS_TOTAL
        .with_label_values(&[method.metric_label()])
        .inc();

    if notification {
        tracing::debug!("Notification {}", request.method);
        return None;
    }

    if request.jsonrpc != JSONRPC_VERSION {
        return Some(McpResponse::err(
            request.id,
            McpError::invalid_request(format!("Unsupported jsonrpc version: {}", request.jsonrpc)),
        ));
    }

    let id = request.id.clone();
    let outcome = dispatch(state, method, request.params).await;
    Some(match outcome {
        Ok(result) => McpResponse::ok(id, result),
        Err(error) => McpResponse::err(id, error),
    })
}

async fn dispatch(
    state: &AppState,
    method: McpMethod,
    params: Option<Value>,
) -> Result<Value, McpError> {
    match method {
        McpMethod::Initialize => to_value(InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: json!({ "tools": { "listChanged": false } }),
            server_info: ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }),
        McpMethod::Ping => Ok(json!({})),
        McpMethod::ToolsList => Ok(json!({ "tools": [tool::definition()] })),
        McpMethod::ToolsCall => {
            let params: ToolCallParams = params
                .ok_or_else(|| McpError::invalid_params("Missing params"))
                .and_then(|p| {
                    serde_json::from_value(p)
                        .map_err(|e| McpError::invalid_params(format!("Invalid params: {}", e)))
                })?;

            if params.name != tool::TOOL_NAME {
                return Err(McpError::invalid_params(format!("Unknown tool: {}", params.name)));
            }

            let result = tool::call(&state.orchestrator, params.arguments).await?;
            to_value(result)
        }
        McpMethod::Custom(name) => Err(McpError::method_not_found(name)),
    }
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, McpError> {
    serde_json::to_value(value).map_err(|e| McpError::internal_error(e.to_string()))
}
