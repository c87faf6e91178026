//! Lifecycle events for sandboxes and tool calls.
//!
//! Events are fire-and-forget: an [`EventEmitter`](crate::traits::EventEmitter)
//! receives each [`EventEnvelope`] and decides where it goes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: String,
    /// Pool component or tool name that raised the event.
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub severity: EventSeverity,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    pub fn new(event_type: EventType, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            actor: "codegate".to_string(),
            timestamp: Utc::now(),
            event_type,
            severity: EventSeverity::Info,
            payload,
        }
    }

    pub fn with_actor(mut self, actor: &str) -> Self {
        self.actor = actor.to_string();
        self
    }

    pub fn with_severity(mut self, severity: EventSeverity) -> Self {
        self.severity = severity;
        self
    }

    /// The sandbox the event concerns, if the payload names one.
    pub fn sandbox_id(&self) -> Option<&str> {
        self.payload.get("sandbox_id").and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    SandboxCreated,
    /// Emitted for explicit, idle and drain terminations alike.
    SandboxTerminated,
    ToolExecStarted,
    ToolExecFinished,
    FsRead,
    FsWrite,
    /// A tool argument was rejected by the input validator.
    SecurityViolation,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Payload of `TOOL_EXEC_*` events.
#[derive(Debug, Serialize, Deserialize)]
pub struct ToolExecPayload {
    pub tool_name: String,
    pub sandbox_id: Option<String>,
    pub duration_ms: Option<u64>,
    /// Sanitized failure text.
    pub error: Option<String>,
}

/// Payload of `FS_*` events. Listing a directory counts as a read.
#[derive(Debug, Serialize, Deserialize)]
pub struct FsPayload {
    pub sandbox_id: String,
    pub path: String,
    pub operation: String,
    pub size_bytes: Option<u64>,
    pub success: bool,
}

/// Payload of `SANDBOX_*` events.
#[derive(Debug, Serialize, Deserialize)]
pub struct SandboxPayload {
    pub sandbox_id: String,
    pub language: String,
    /// `created`, or the termination reason.
    pub reason: String,
    /// Remote teardown failure, if any.
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_wire_name() {
        let json = serde_json::to_string(&EventType::SandboxTerminated).unwrap();
        assert_eq!(json, "\"SANDBOX_TERMINATED\"");
    }

    #[test]
    fn test_sandbox_id_from_payload() {
        let payload = SandboxPayload {
            sandbox_id: "sbx-7".into(),
            language: "python".into(),
            reason: "idle".into(),
            error: None,
        };
        let event = EventEnvelope::new(
            EventType::SandboxTerminated,
            serde_json::to_value(payload).unwrap(),
        )
        .with_actor("sandbox-pool")
        .with_severity(EventSeverity::Info);

        assert_eq!(event.sandbox_id(), Some("sbx-7"));
        assert_eq!(event.actor, "sandbox-pool");

        let bare = EventEnvelope::new(EventType::ToolExecStarted, serde_json::json!({}));
        assert_eq!(bare.sandbox_id(), None);
    }
}
