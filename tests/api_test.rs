//! Admin API tests against an in-process manager.

use std::{borrow::Cow, sync::Arc};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use data_connector::MemoryRegistryStorage;
use gateway::{routers::error::HEADER_X_GATEWAY_ERROR_KIND, server::build_app};
use gateway_mcp::{
    ClientFactory, JsonObject, McpConfig, McpError, McpManager, McpResult, McpServerConfig,
    RefreshRequest, Tool, UpstreamClient,
};
use http_body_util::BodyExt;
use parking_lot::Mutex;
use rmcp::model::{CallToolResult, Content};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;

struct Calculator;

fn tool(name: &str) -> Tool {
    Tool {
        name: Cow::Owned(name.to_string()),
        title: None,
        description: Some(Cow::Borrowed("calculator tool")),
        input_schema: Arc::new(JsonObject::new()),
        output_schema: None,
        annotations: None,
        icons: None,
    }
}

#[async_trait]
impl UpstreamClient for Calculator {
    async fn list_tools(&self) -> McpResult<Vec<Tool>> {
        Ok(vec![tool("add"), tool("sub")])
    }

    async fn call_tool(&self, name: &str, arguments: Option<JsonObject>) -> McpResult<CallToolResult> {
        let arguments = arguments.unwrap_or_default();
        let n = |k: &str| arguments.get(k).and_then(Value::as_i64).unwrap_or(0);
        let value = match name {
            "add" => n("a") + n("b"),
            "sub" => n("a") - n("b"),
            other => return Err(McpError::ToolExecution(format!("unknown tool {other}"))),
        };
        Ok(CallToolResult::success(vec![Content::text(value.to_string())]))
    }
}

#[derive(Default)]
struct CalculatorFactory {
    unreachable: Mutex<Vec<String>>,
}

#[async_trait]
impl ClientFactory for CalculatorFactory {
    async fn connect(
        &self,
        config: &McpServerConfig,
        _refresh_tx: mpsc::Sender<RefreshRequest>,
    ) -> McpResult<Arc<dyn UpstreamClient>> {
        if self.unreachable.lock().contains(&config.name) {
            return Err(McpError::ConnectionFailed(format!("{}: refused", config.name)));
        }
        Ok(Arc::new(Calculator))
    }
}

async fn test_app() -> Router {
    let factory = Arc::new(CalculatorFactory::default());
    factory.unreachable.lock().push("offline".to_string());
    let manager = McpManager::new(
        McpConfig::default(),
        Arc::new(MemoryRegistryStorage::new()),
        factory,
    )
    .await
    .unwrap();
    build_app(manager)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn calc_server() -> Value {
    json!({
        "name": "calc",
        "description": "calculator",
        "transport": "streamable_http",
        "url": "http://localhost:9000/mcp",
        "token": "secret-token"
    })
}

#[tokio::test]
async fn test_register_and_list() {
    let app = test_app().await;

    let (status, body) = send(&app, json_request("POST", "/api/v0/servers", calc_server())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["name"], "calc");
    assert_ne!(body["token"], "secret-token");

    let (status, body) = send(&app, empty_request("GET", "/api/v0/servers")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert!(!body.to_string().contains("secret-token"));

    let (status, body) = send(&app, empty_request("GET", "/api/v0/tools")).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body["tools"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert_eq!(names, vec!["calc::add", "calc::sub"]);

    let (status, _) = send(&app, empty_request("GET", "/api/v0/servers/calc")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_register_rejections() {
    let app = test_app().await;
    send(&app, json_request("POST", "/api/v0/servers", calc_server())).await;

    let (status, body) = send(&app, json_request("POST", "/api/v0/servers", calc_server())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");

    let bad_name = json!({"name": "a::b", "transport": "stdio", "command": "x"});
    let (status, _) = send(&app, json_request("POST", "/api/v0/servers", bad_name)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req = Request::builder()
        .method("POST")
        .uri("/api/v0/servers")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");

    let offline = json!({"name": "offline", "transport": "stdio", "command": "x"});
    let (status, body) = send(&app, json_request("POST", "/api/v0/servers", offline)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["kind"], "connection");

    let (_, body) = send(&app, empty_request("GET", "/api/v0/servers")).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_invoke_and_enablement() {
    let app = test_app().await;
    send(&app, json_request("POST", "/api/v0/servers", calc_server())).await;

    let call = json!({"name": "calc::add", "a": 2, "b": 3});
    let (status, body) = send(&app, json_request("POST", "/api/v0/tools/invoke", call.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"][0]["text"], "5");

    let (status, body) = send(&app, empty_request("POST", "/api/v0/tools/disable?entity=calc::add")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["disabled"], json!(["calc::add"]));

    let resp = app
        .clone()
        .oneshot(json_request("POST", "/api/v0/tools/invoke", call.clone()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        resp.headers().get(HEADER_X_GATEWAY_ERROR_KIND).unwrap(),
        "disabled"
    );

    let (status, body) = send(&app, empty_request("POST", "/api/v0/tools/enable?entity=calc")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enabled"].as_array().unwrap().len(), 2);

    let (status, _) = send(&app, json_request("POST", "/api/v0/tools/invoke", call)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_not_found_paths() {
    let app = test_app().await;

    let call = json!({"name": "calc::add"});
    let (status, body) = send(&app, json_request("POST", "/api/v0/tools/invoke", call)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");

    let (status, _) = send(&app, empty_request("GET", "/api/v0/servers/ghost")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, empty_request("DELETE", "/api/v0/servers/ghost")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, empty_request("GET", "/api/v0/tools?server=ghost")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let missing_name = json!({"a": 1});
    let (status, _) = send(&app, json_request("POST", "/api/v0/tools/invoke", missing_name)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_bad_query_parameters() {
    let app = test_app().await;
    send(&app, json_request("POST", "/api/v0/servers", calc_server())).await;

    let cases = [
        ("POST", "/api/v0/tools/enable?entity=ghost"),
        ("POST", "/api/v0/tools/disable?entity=calc::missing"),
        ("POST", "/api/v0/tools/disable"),
        ("POST", "/api/v0/tools/enable?entity="),
        ("GET", "/api/v0/tool"),
        ("GET", "/api/v0/tool?name=%20"),
    ];
    for (method, uri) in cases {
        let (status, body) = send(&app, empty_request(method, uri)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{method} {uri}");
        assert_eq!(body["kind"], "validation", "{method} {uri}");
        assert!(body["error"].is_string(), "{method} {uri}");
    }
}

#[tokio::test]
async fn test_deregister_removes_tools() {
    let app = test_app().await;
    send(&app, json_request("POST", "/api/v0/servers", calc_server())).await;

    let (status, _) = send(&app, empty_request("DELETE", "/api/v0/servers/calc")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = send(&app, empty_request("GET", "/api/v0/tools")).await;
    assert!(body["tools"].as_array().unwrap().is_empty());

    let (status, _) = send(&app, empty_request("GET", "/api/v0/tool?name=calc::add")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_and_metrics() {
    let app = test_app().await;
    send(&app, json_request("POST", "/api/v0/servers", calc_server())).await;
    send(
        &app,
        json_request("POST", "/api/v0/tools/invoke", json!({"name": "calc::sub", "a": 5, "b": 2})),
    )
    .await;

    let (status, body) = send(&app, empty_request("GET", "/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["stats"]["servers"], 1);
    assert_eq!(body["stats"]["tools"], 2);

    let (status, body) = send(&app, empty_request("GET", "/metrics")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_calls"], 1);
    assert_eq!(body["successful_calls"], 1);
}
