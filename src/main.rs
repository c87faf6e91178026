//! Codegate - sandboxed code execution gateway.
//!
//! Exposes Python/JavaScript execution, sandbox file operations and package
//! installation as tools, backed by a pool of remote sandboxes.

use std::sync::Arc;

use codegate_core::config::AppConfig;
use codegate_core::traits::ToolRegistry;
use codegate_gateway::{DefaultToolRegistry, GatewayConfig, GatewayServer};
use codegate_governance::{InputValidator, OutputSanitizer, TracingEventEmitter};
use codegate_sandbox::{
    all_tools, ExecutionGateway, PoolLifecycle, RemoteSandbox, SandboxPool, SandboxProvider,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    codegate_governance::configure_tracing(&config.logging)?;

    tracing::info!("Starting Codegate v{}", env!("CARGO_PKG_VERSION"));

    // Refuse to start without a provider credential
    let api_key = config.api_key()?.clone();

    let metrics_handle = codegate_governance::setup_metrics_recorder()?;

    // =========================================================================
    // Sandbox pool
    // =========================================================================
    let provider = Arc::new(RemoteSandbox::new(&config.provider, api_key)?);
    if !provider.is_available().await {
        tracing::warn!(
            base_url = %config.provider.base_url,
            "Sandbox provider is not reachable yet; tools will fail until it is"
        );
    }

    let pool = Arc::new(
        SandboxPool::new(provider, config.pool.clone())
            .with_event_emitter(Arc::new(TracingEventEmitter)),
    );
    let lifecycle = PoolLifecycle::new(pool.clone());
    lifecycle.start().await;

    // =========================================================================
    // Execution gateway & tools
    // =========================================================================
    let validator = Arc::new(InputValidator::new(config.validation.clone()));
    let sanitizer = Arc::new(OutputSanitizer::new(&config.sanitizer));
    let gateway = Arc::new(
        ExecutionGateway::new(pool, validator, sanitizer, config.execution.clone())
            .with_event_emitter(Arc::new(TracingEventEmitter)),
    );

    let tools = Arc::new(DefaultToolRegistry::new());
    for tool in all_tools(gateway) {
        tools.register(tool).await?;
    }
    tracing::info!(tools_count = tools.len(), "Tool registry initialized");

    // =========================================================================
    // HTTP transport
    // =========================================================================
    let server =
        GatewayServer::new(GatewayConfig::from(&config.server), tools).with_metrics(metrics_handle);

    let served = server.run().await;

    let report = lifecycle.shutdown().await;
    tracing::info!(
        terminated = report.terminated,
        failed = report.failed,
        "Codegate stopped"
    );

    served?;
    Ok(())
}
