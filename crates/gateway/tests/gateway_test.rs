//! HTTP transport tests driving the real tools over a mock provider.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use codegate_core::config::{ExecutionConfig, PoolConfig, SanitizerConfig, ValidationConfig};
use codegate_core::traits::ToolRegistry;
use codegate_gateway::{DefaultToolRegistry, GatewayConfig, GatewayServer};
use codegate_governance::{InputValidator, OutputSanitizer};
use codegate_sandbox::{all_tools, Execution, ExecutionGateway, MockSandbox, SandboxPool};

async fn app(mock: Arc<MockSandbox>) -> Router {
    let pool = Arc::new(SandboxPool::new(mock, PoolConfig::default()));
    let gateway = Arc::new(ExecutionGateway::new(
        pool,
        Arc::new(InputValidator::new(ValidationConfig::default())),
        Arc::new(OutputSanitizer::new(&SanitizerConfig::default())),
        ExecutionConfig::default(),
    ));

    let registry = Arc::new(DefaultToolRegistry::new());
    for tool in all_tools(gateway) {
        registry.register(tool).await.unwrap();
    }

    GatewayServer::new(GatewayConfig::default(), registry).build_router()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = app(Arc::new(MockSandbox::new())).await;
    let (status, body) = send(
        app,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_list_tools() {
    let app = app(Arc::new(MockSandbox::new())).await;
    let (status, body) = send(
        app,
        Request::builder().uri("/v1/tools").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names.len(), 7);
    assert!(names.contains(&"execute_python"));
    assert!(names.contains(&"get_sandbox_info"));
}

#[tokio::test]
async fn test_execute_python_over_http() {
    let mock = Arc::new(MockSandbox::with_executions(vec![Execution::stdout("4\n")]));
    let app = app(mock.clone()).await;

    let (status, body) = send(
        app,
        post(
            "/v1/tools/execute_python",
            json!({"code": "print(2 + 2)"}).to_string(),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["content"], "4");
    assert_eq!(mock.run_count(), 1);
}

#[tokio::test]
async fn test_tool_failure_is_ok_status() {
    let mock = Arc::new(MockSandbox::new());
    let app = app(mock.clone()).await;

    let (status, body) = send(
        app,
        post(
            "/v1/tools/read_file",
            json!({"path": "../../etc/passwd"}).to_string(),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["data"]["error_code"], "VALIDATION_FAILED");
    assert_eq!(mock.create_count(), 0);
}

#[tokio::test]
async fn test_empty_body_for_argumentless_tool() {
    let app = app(Arc::new(MockSandbox::new())).await;
    let (status, body) = send(app, post("/v1/tools/get_sandbox_info", Body::empty())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn test_unknown_tool_is_not_found() {
    let app = app(Arc::new(MockSandbox::new())).await;
    let (status, body) = send(app, post("/v1/tools/execute_ruby", "{}")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "TOOL_NOT_FOUND");
    assert!(body["trace_id"].is_string());
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let app = app(Arc::new(MockSandbox::new())).await;
    let (status, body) = send(app, post("/v1/tools/execute_python", "{not json")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn test_graceful_shutdown_returns() {
    let registry = Arc::new(DefaultToolRegistry::new());
    let config = GatewayConfig {
        port: 0,
        ..GatewayConfig::default()
    };
    let server = GatewayServer::new(config, registry);

    // Resolves immediately, so the server binds and then stops
    server.run_until(async {}).await.unwrap();
}
