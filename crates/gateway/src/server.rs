//! Axum-based HTTP server exposing the tool registry.

use axum::{
    body::Bytes,
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use codegate_core::{
    config::ServerConfig,
    traits::ToolRegistry,
    types::ToolDefinition,
    Error, Result,
};

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to bind to.
    pub port: u16,
    /// Enable CORS.
    pub enable_cors: bool,
    /// Enable request tracing.
    pub enable_tracing: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for GatewayConfig {
    fn from(server: &ServerConfig) -> Self {
        Self {
            host: server.host.clone(),
            port: server.port,
            enable_cors: server.enable_cors,
            enable_tracing: true,
        }
    }
}

/// Shared application state.
pub struct AppState {
    /// Tools served over HTTP.
    pub tools: Arc<dyn ToolRegistry>,
}

/// Gateway server.
pub struct GatewayServer {
    config: GatewayConfig,
    state: Arc<AppState>,
    metrics_handle: Option<PrometheusHandle>,
}

impl GatewayServer {
    /// Create a new gateway server.
    pub fn new(config: GatewayConfig, tools: Arc<dyn ToolRegistry>) -> Self {
        Self {
            config,
            state: Arc::new(AppState { tools }),
            metrics_handle: None,
        }
    }

    /// Set metrics handle.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Build the Axum router.
    pub fn build_router(&self) -> Router {
        let mut router = Router::new()
            .route("/health", get(health_handler))
            .route("/v1/tools", get(list_tools_handler))
            .route("/v1/tools/:name", post(call_tool_handler))
            .with_state(self.state.clone());

        if let Some(handle) = &self.metrics_handle {
            let handle = handle.clone();
            router = router.route("/metrics", get(move || async move { handle.render() }));
        }

        if self.config.enable_cors {
            router = router.layer(CorsLayer::new().allow_origin(Any).allow_methods(Any));
        }

        if self.config.enable_tracing {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    /// Run the server until Ctrl-C or SIGTERM.
    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Run the server until `signal` resolves, then finish in-flight requests.
    pub async fn run_until<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::gateway(format!("Failed to bind {}: {}", addr, e)))?;

        tracing::info!(addr = %addr, "Gateway server starting");

        axum::serve(listener, self.build_router())
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| Error::gateway(format!("Server error: {}", e)))?;

        tracing::info!("Gateway server stopped");
        Ok(())
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status.
    pub status: String,
    /// Version.
    pub version: String,
}

/// Tool listing.
#[derive(Debug, Serialize)]
pub struct ToolsResponse {
    pub tools: Vec<ToolDefinition>,
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
    /// Trace ID.
    pub trace_id: Option<String>,
}

fn error_response(status: StatusCode, error: &Error, trace_id: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            code: error.code().to_string(),
            message: error.to_string(),
            trace_id: Some(trace_id.to_string()),
        }),
    )
        .into_response()
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn list_tools_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.tools.list().await {
        Ok(tools) => Json(ToolsResponse { tools }).into_response(),
        Err(e) => {
            let trace_id = Uuid::new_v4().to_string();
            tracing::error!(trace_id = %trace_id, error = %e, "Failed to list tools");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e, &trace_id)
        }
    }
}

/// Tool invocation handler.
///
/// The body is the tool's argument object. An empty body is passed to the
/// tool as `null`. Tool-level failures come back as a `200` with
/// `success: false`; only transport problems use an error status.
async fn call_tool_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Response {
    let trace_id = Uuid::new_v4().to_string();

    let args = if body.iter().all(u8::is_ascii_whitespace) {
        serde_json::Value::Null
    } else {
        match serde_json::from_slice(&body) {
            Ok(args) => args,
            Err(e) => {
                let error = Error::invalid_request(format!("Invalid JSON body: {}", e));
                return error_response(StatusCode::BAD_REQUEST, &error, &trace_id);
            }
        }
    };

    tracing::info!(trace_id = %trace_id, tool = %name, "Tool call received");

    match state.tools.execute(&name, args).await {
        Ok(output) => {
            if !output.success {
                tracing::debug!(
                    trace_id = %trace_id,
                    tool = %name,
                    error_code = output.error_code().unwrap_or("UNKNOWN"),
                    "Tool returned a failure envelope"
                );
            }
            (StatusCode::OK, Json(output)).into_response()
        }
        Err(e @ Error::ToolNotFound(_)) => error_response(StatusCode::NOT_FOUND, &e, &trace_id),
        Err(e) => {
            tracing::error!(trace_id = %trace_id, tool = %name, error = %e, "Tool call failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e, &trace_id)
        }
    }
}
