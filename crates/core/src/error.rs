//! Error types for Codegate.

use thiserror::Error;

use crate::types::{Language, Violation};

/// Result type alias using Codegate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Codegate.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Request Errors
    // =========================================================================
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Validation failed for '{field}': {reason}")]
    Validation {
        field: String,
        violation: Violation,
        reason: String,
    },

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    // =========================================================================
    // Sandbox Errors
    // =========================================================================
    #[error("Sandbox provisioning failed: {0}")]
    ProvisioningFailed(String),

    #[error("Sandbox not found: {0}")]
    SandboxNotFound(String),

    #[error("Sandbox {id} runs {actual}, not {expected}")]
    LanguageMismatch {
        id: String,
        expected: Language,
        actual: Language,
    },

    #[error("Remote sandbox error: {0}")]
    Remote(String),

    #[error("Sandbox pool is shutting down")]
    ShuttingDown,

    // =========================================================================
    // Platform Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Governance error: {0}")]
    Governance(String),

    // =========================================================================
    // Generic Errors
    // =========================================================================
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create an invalid request error.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a tool not found error.
    pub fn tool_not_found(name: impl Into<String>) -> Self {
        Self::ToolNotFound(name.into())
    }

    /// Create a provisioning error.
    pub fn provisioning(msg: impl Into<String>) -> Self {
        Self::ProvisioningFailed(msg.into())
    }

    /// Create a sandbox not found error.
    pub fn sandbox_not_found(id: impl Into<String>) -> Self {
        Self::SandboxNotFound(id.into())
    }

    /// Create a remote sandbox error.
    pub fn remote(msg: impl Into<String>) -> Self {
        Self::Remote(msg.into())
    }

    /// Create a timeout error.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a gateway error.
    pub fn gateway(msg: impl Into<String>) -> Self {
        Self::Gateway(msg.into())
    }

    /// Create a governance error.
    pub fn governance(msg: impl Into<String>) -> Self {
        Self::Governance(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable error code surfaced in tool envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::Validation { .. } => "VALIDATION_FAILED",
            Self::ToolNotFound(_) => "TOOL_NOT_FOUND",
            Self::ProvisioningFailed(_) => "PROVISIONING_FAILED",
            Self::SandboxNotFound(_) => "SANDBOX_NOT_FOUND",
            Self::LanguageMismatch { .. } => "LANGUAGE_MISMATCH",
            Self::Remote(_) => "REMOTE_ERROR",
            Self::ShuttingDown => "SHUTTING_DOWN",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Gateway(_) => "GATEWAY_ERROR",
            Self::Governance(_) => "GOVERNANCE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) | Self::Other(_) => "INTERNAL_ERROR",
            Self::Timeout(_) => "TIMEOUT",
        }
    }

    /// Whether the error was caused by caller-supplied input.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::InvalidRequest(_))
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(Error::timeout("30s").code(), "TIMEOUT");
        assert_eq!(Error::sandbox_not_found("sbx").code(), "SANDBOX_NOT_FOUND");
        assert!(Error::invalid_request("missing code").is_validation());
        assert!(!Error::remote("boom").is_validation());
    }

    #[test]
    fn test_language_mismatch_message() {
        let err = Error::LanguageMismatch {
            id: "sbx-1".into(),
            expected: Language::JavaScript,
            actual: Language::Python,
        };
        assert_eq!(err.to_string(), "Sandbox sbx-1 runs python, not javascript");
    }
}
