//! Administrative API under `/api/v0`.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use gateway_mcp::{JsonObject, McpServerConfig};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::error::{bad_request, ApiError, ApiResult};
use crate::server::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/servers", get(list_servers).post(register_server))
        .route("/servers/{name}", get(get_server).delete(deregister_server))
        .route("/servers/{name}/refresh", post(refresh_server))
        .route("/tools", get(list_tools))
        .route("/tool", get(get_tool))
        .route("/tools/invoke", post(invoke_tool))
        .route("/tools/enable", post(enable_tools))
        .route("/tools/disable", post(disable_tools))
}

#[derive(Debug, Deserialize)]
pub struct ToolsQuery {
    pub server: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ToolQuery {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct EntityQuery {
    pub entity: String,
}

/// Required non-blank query parameter; failures answer with a JSON 400.
fn required_param<T>(
    query: Result<Query<T>, QueryRejection>,
    field: &str,
    value: impl FnOnce(T) -> String,
) -> Result<String, Response> {
    let Query(query) = query.map_err(|rejection| bad_request(rejection.body_text()))?;
    let value = value(query);
    if value.trim().is_empty() {
        return Err(bad_request(format!("query parameter '{field}' must not be empty")));
    }
    Ok(value)
}

async fn register_server(
    State(state): State<AppState>,
    body: Result<Json<McpServerConfig>, JsonRejection>,
) -> Response {
    let Json(config) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    match state.manager.register(config).await {
        Ok(server) => (StatusCode::CREATED, Json(server)).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

async fn deregister_server(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    state.manager.deregister(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_servers(State(state): State<AppState>) -> Json<Vec<McpServerConfig>> {
    Json(state.manager.list_servers())
}

async fn get_server(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<McpServerConfig>> {
    Ok(Json(state.manager.get_server(&name)?))
}

async fn refresh_server(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    let tools = state.manager.refresh_server(&name).await?;
    Ok(Json(json!({ "server": name, "tools": tools })))
}

async fn list_tools(
    State(state): State<AppState>,
    Query(query): Query<ToolsQuery>,
) -> ApiResult<Json<Value>> {
    let tools = match &query.server {
        Some(server) => state.manager.list_tools_by_server(server)?,
        None => state.manager.list_tools(),
    };
    Ok(Json(json!({ "tools": tools })))
}

async fn get_tool(
    State(state): State<AppState>,
    query: Result<Query<ToolQuery>, QueryRejection>,
) -> Response {
    let name = match required_param(query, "name", |q| q.name) {
        Ok(name) => name,
        Err(response) => return response,
    };
    match state.manager.get_tool(&name) {
        Ok(tool) => Json(tool).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

/// Body is `{"name": "<server>::<tool>", ...arguments}`.
async fn invoke_tool(
    State(state): State<AppState>,
    body: Result<Json<JsonObject>, JsonRejection>,
) -> Response {
    let mut body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    let name = match body.remove("name") {
        Some(Value::String(name)) => name,
        _ => return bad_request("body must carry a string 'name'"),
    };
    debug!(tool = %name, "Invoking tool via admin API");

    let arguments = (!body.is_empty()).then_some(body);
    match state.manager.invoke(&name, arguments).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

async fn enable_tools(
    State(state): State<AppState>,
    query: Result<Query<EntityQuery>, QueryRejection>,
) -> Response {
    set_enabled(&state, query, true).await
}

async fn disable_tools(
    State(state): State<AppState>,
    query: Result<Query<EntityQuery>, QueryRejection>,
) -> Response {
    set_enabled(&state, query, false).await
}

async fn set_enabled(
    state: &AppState,
    query: Result<Query<EntityQuery>, QueryRejection>,
    enabled: bool,
) -> Response {
    let entity = match required_param(query, "entity", |q| q.entity) {
        Ok(entity) => entity,
        Err(response) => return response,
    };
    let (result, key) = if enabled {
        (state.manager.enable_tools(&entity).await, "enabled")
    } else {
        (state.manager.disable_tools(&entity).await, "disabled")
    };
    match result {
        Ok(names) => Json(json!({ key: names })).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}
