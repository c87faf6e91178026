//! Remote sandbox provider abstraction.
//!
//! The gateway never runs code itself. Every sandbox lives behind a
//! [`SandboxProvider`], which provisions, drives and tears down isolated
//! environments on a remote service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use codegate_core::{Language, Result};

// =============================================================================
// Provider Types
// =============================================================================

/// Sandbox identifier. Pool ids are generated locally; provider sessions use the same type.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SandboxId(pub String);

impl SandboxId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SandboxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SandboxId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One rich result produced by an execution (e.g. the value of the last
/// expression in a notebook-style cell).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    #[serde(default)]
    pub text: Option<String>,
}

/// Error raised by the executed code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionError {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub traceback: String,
}

/// Outcome of running code in a sandbox.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    #[serde(default)]
    pub stdout: Vec<String>,
    #[serde(default)]
    pub stderr: Vec<String>,
    #[serde(default)]
    pub results: Vec<ExecutionResult>,
    #[serde(default)]
    pub error: Option<ExecutionError>,
}

impl Execution {
    /// Execution that only wrote to stdout.
    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            stdout: vec![text.into()],
            ..Default::default()
        }
    }

    /// Execution that raised an error.
    pub fn failed(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            error: Some(ExecutionError {
                name: name.into(),
                value: value.into(),
                traceback: String::new(),
            }),
            ..Default::default()
        }
    }

    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    /// Flatten every output channel into one text block.
    pub fn combined_output(&self) -> String {
        let mut sections: Vec<String> = Vec::new();

        let stdout = self.stdout.concat();
        if !stdout.is_empty() {
            sections.push(stdout.trim_end_matches('\n').to_string());
        }

        let results: Vec<&str> = self
            .results
            .iter()
            .filter_map(|r| r.text.as_deref())
            .filter(|t| !t.is_empty())
            .collect();
        if !results.is_empty() {
            sections.push(results.join("\n"));
        }

        let stderr = self.stderr.concat();
        if !stderr.is_empty() {
            sections.push(format!("--- stderr ---\n{}", stderr.trim_end_matches('\n')));
        }

        if let Some(error) = &self.error {
            let mut block = format!("--- error ---\n{}: {}", error.name, error.value);
            if !error.traceback.is_empty() {
                block.push('\n');
                block.push_str(error.traceback.trim_end_matches('\n'));
            }
            sections.push(block);
        }

        sections.join("\n")
    }
}

/// Entry returned by a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub is_dir: bool,
}

// =============================================================================
// Provider Trait
// =============================================================================

/// Remote capability used by the pool and the gateway.
///
/// Implementations must be safe to call concurrently for different sandboxes.
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    /// Provision a sandbox able to run `language`.
    async fn create(&self, language: Language) -> Result<SandboxId>;

    /// Tear a sandbox down.
    async fn destroy(&self, id: &SandboxId) -> Result<()>;

    /// Run a code snippet, giving up after `timeout`.
    async fn run_code(
        &self,
        id: &SandboxId,
        language: Language,
        code: &str,
        timeout: Duration,
    ) -> Result<Execution>;

    async fn write_file(&self, id: &SandboxId, path: &str, content: &str) -> Result<()>;

    async fn read_file(&self, id: &SandboxId, path: &str) -> Result<String>;

    async fn list_directory(&self, id: &SandboxId, path: &str) -> Result<Vec<FileEntry>>;

    /// Whether the provider is reachable.
    async fn is_available(&self) -> bool;
}
