//! Metrics implementation using Prometheus.

use codegate_core::{Error, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Initialize Prometheus recorder and return the handle.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::governance(format!("Failed to install Prometheus recorder: {}", e)))?;

    tracing::info!("Prometheus metrics recorder initialized");
    Ok(handle)
}

/// Track one tool invocation (count by outcome, latency).
pub fn track_tool_call(tool: &str, success: bool, latency_sec: f64) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!(
        "codegate_tool_calls_total",
        "tool" => tool.to_string(),
        "outcome" => outcome
    )
    .increment(1);

    metrics::histogram!("codegate_tool_duration_seconds", "tool" => tool.to_string())
        .record(latency_sec);
}

pub fn track_sandbox_created(language: &str) {
    metrics::counter!("codegate_sandboxes_created_total", "language" => language.to_string())
        .increment(1);
}

/// `reason` is one of `explicit`, `idle`, `drain`.
pub fn track_sandbox_terminated(reason: &str) {
    metrics::counter!("codegate_sandboxes_terminated_total", "reason" => reason.to_string())
        .increment(1);
}

pub fn set_active_sandboxes(count: usize) {
    metrics::gauge!("codegate_active_sandboxes").set(count as f64);
}

/// `violation` is `none` for events that are not validation failures.
pub fn track_security_event(kind: &str, field: &str, violation: Option<&str>) {
    metrics::counter!(
        "codegate_security_events_total",
        "kind" => kind.to_string(),
        "field" => field.to_string(),
        "violation" => violation.unwrap_or("none").to_string()
    )
    .increment(1);
}
