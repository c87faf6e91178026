use serde::{Deserialize, Serialize};

/// Envelope every tool returns, success or failure.
///
/// Failures carry a stable `error_code` in `data`; see [`ToolOutput::error_code`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,

    /// Sanitized text shown to the caller.
    pub content: String,

    /// Sandbox id, duration, truncation flags, error code, ...
    pub data: Option<serde_json::Value>,
}

impl ToolOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: content.into(),
            data: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            content: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// `data.error_code`, present on failures.
    pub fn error_code(&self) -> Option<&str> {
        self.data.as_ref()?.get("error_code")?.as_str()
    }

    /// `data.sandbox_id`, present once a sandbox was resolved.
    pub fn sandbox_id(&self) -> Option<&str> {
        self.data.as_ref()?.get("sandbox_id")?.as_str()
    }
}

/// What a tool advertises to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema of the argument object.
    pub parameters: serde_json::Value,
}
