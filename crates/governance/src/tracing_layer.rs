//! Distributed tracing configuration.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use codegate_core::config::LoggingConfig;
use codegate_core::{Error, Result};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace as sdktrace, Resource};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Build the filter: `RUST_LOG` wins, otherwise the configured level.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Configure logging and optional OpenTelemetry export.
///
/// Console output always goes to stderr. In production, JSON lines are also
/// appended to `config.log_file`.
pub fn configure_tracing(config: &LoggingConfig) -> Result<()> {
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let file_layer = if config.is_production() {
        let file = open_log_file(Path::new(&config.log_file))?;
        Some(
            tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .boxed(),
        )
    } else {
        None
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter(config))
        .with(fmt_layer)
        .with(file_layer);

    // Check OTLP endpoint
    if let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
        let provider = otlp_provider(&endpoint)?;
        let otel_layer = tracing_opentelemetry::layer().with_tracer(provider.tracer("codegate"));
        opentelemetry::global::set_tracer_provider(provider);

        registry
            .with(otel_layer)
            .try_init()
            .map_err(|e| Error::governance(format!("Failed to install subscriber: {}", e)))?;
        tracing::info!(endpoint = %endpoint, "OpenTelemetry tracing enabled");
    } else {
        registry
            .try_init()
            .map_err(|e| Error::governance(format!("Failed to install subscriber: {}", e)))?;
    }

    if config.is_production() {
        tracing::info!(log_file = %config.log_file, "File logging enabled");
    }

    Ok(())
}

/// Batch OTLP export over gRPC. Must be called from inside a Tokio runtime.
fn otlp_provider(endpoint: &str) -> Result<sdktrace::TracerProvider> {
    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .with_trace_config(
            sdktrace::config().with_resource(Resource::new(vec![KeyValue::new(
                "service.name",
                "codegate",
            )])),
        )
        .install_batch(runtime::Tokio)
        .map_err(|e| Error::governance(format!("Failed to install OTLP pipeline: {}", e)))
}

fn open_log_file(path: &Path) -> Result<fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            Error::config(format!("Cannot create log directory {}: {}", parent.display(), e))
        })?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::config(format!("Cannot open log file {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_log_file_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/logs/codegate.log");
        open_log_file(&path).unwrap();
        assert!(path.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_otlp_provider_yields_named_tracer() {
        use opentelemetry::trace::{Tracer as _, TracerProvider as _};

        // The tonic channel connects lazily, so no collector is needed
        let provider = otlp_provider("http://127.0.0.1:4317").unwrap();
        let tracer = provider.tracer("codegate");
        tracer.in_span("startup", |_cx| {});
    }

    #[test]
    fn test_env_filter_uses_configured_level() {
        let config = LoggingConfig {
            level: "debug".into(),
            ..LoggingConfig::default()
        };
        if std::env::var("RUST_LOG").is_err() {
            assert!(env_filter(&config).to_string().contains("debug"));
        }
    }
}
