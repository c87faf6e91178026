//! Execution gateway.
//!
//! The one path every tool call takes: validate input, resolve a sandbox,
//! call the provider under a timeout, sanitize what comes back, and wrap the
//! outcome in a [`ToolOutput`]. [`ExecutionGateway::run`] is the boundary
//! where every error becomes a failure envelope.

use serde::Serialize;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use codegate_core::config::ExecutionConfig;
use codegate_core::{
    Error, EventEmitter, EventEnvelope, EventSeverity, EventType, FsPayload, Language,
    NoOpEventEmitter, Result, ToolExecPayload, ToolOutput,
};
use codegate_governance::{metrics, InputValidator, OutputSanitizer};

use crate::pool::{SandboxHandle, SandboxPool};
use crate::provider::{Execution, FileEntry, SandboxId};
use crate::tools::install_script;

pub struct ExecutionGateway {
    pool: Arc<SandboxPool>,
    validator: Arc<InputValidator>,
    sanitizer: Arc<OutputSanitizer>,
    config: ExecutionConfig,
    event_emitter: Arc<dyn EventEmitter>,
}

impl ExecutionGateway {
    pub fn new(
        pool: Arc<SandboxPool>,
        validator: Arc<InputValidator>,
        sanitizer: Arc<OutputSanitizer>,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            pool,
            validator,
            sanitizer,
            config,
            event_emitter: Arc::new(NoOpEventEmitter),
        }
    }

    /// Set an event emitter for auditing tool calls and file operations.
    pub fn with_event_emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.event_emitter = emitter;
        self
    }

    pub fn pool(&self) -> &Arc<SandboxPool> {
        &self.pool
    }

    // =========================================================================
    // Boundary
    // =========================================================================

    /// Run one tool invocation, converting any error into a failure envelope.
    pub async fn run<F>(&self, tool: &str, work: F) -> ToolOutput
    where
        F: Future<Output = Result<ToolOutput>>,
    {
        let started = Instant::now();
        self.emit(
            EventType::ToolExecStarted,
            EventSeverity::Debug,
            tool,
            ToolExecPayload {
                tool_name: tool.to_string(),
                sandbox_id: None,
                duration_ms: None,
                error: None,
            },
        )
        .await;

        let result = work.await;
        let elapsed = started.elapsed();

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                if let Error::Validation {
                    field, violation, ..
                } = &e
                {
                    tracing::info!(tool, error = %e, "Tool call rejected");
                    self.emit(
                        EventType::SecurityViolation,
                        EventSeverity::Warning,
                        tool,
                        json!({"field": field, "violation": violation.as_str()}),
                    )
                    .await;
                } else if e.is_validation() {
                    tracing::info!(tool, error = %e, "Tool call rejected");
                } else {
                    tracing::warn!(
                        tool,
                        error = %e,
                        duration_ms = elapsed.as_millis() as u64,
                        "Tool call failed"
                    );
                }
                self.failure(&e, elapsed)
            }
        };

        metrics::track_tool_call(tool, output.success, elapsed.as_secs_f64());
        tracing::debug!(
            tool,
            success = output.success,
            duration_ms = elapsed.as_millis() as u64,
            "Tool call finished"
        );

        let sandbox_id = output.sandbox_id().map(str::to_string);
        let severity = if output.success {
            EventSeverity::Info
        } else {
            EventSeverity::Warning
        };
        self.emit(
            EventType::ToolExecFinished,
            severity,
            tool,
            ToolExecPayload {
                tool_name: tool.to_string(),
                sandbox_id,
                duration_ms: Some(elapsed.as_millis() as u64),
                error: (!output.success).then(|| output.content.clone()),
            },
        )
        .await;

        output
    }

    fn failure(&self, error: &Error, elapsed: Duration) -> ToolOutput {
        let mut data = json!({
            "error_code": error.code(),
            "duration_ms": elapsed.as_millis() as u64,
        });
        if let Error::Validation {
            field, violation, ..
        } = error
        {
            data["field"] = json!(field);
            data["violation"] = json!(violation.as_str());
        }
        // Remote error text can echo sandbox output.
        ToolOutput::error(self.sanitizer.sanitize(&error.to_string())).with_data(data)
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Run a code snippet.
    pub async fn execute_code(
        &self,
        language: Language,
        code: &str,
        sandbox_id: Option<&str>,
    ) -> Result<ToolOutput> {
        self.validator
            .validate_code(code, language)
            .into_result("code")?;

        let handle = self.resolve(language, sandbox_id, true).await?;
        let started = Instant::now();
        let execution = self.run_code(&handle, code).await?;
        let elapsed = started.elapsed();

        Ok(self.execution_output(&handle, &execution, elapsed, json!({})))
    }

    /// Write a file into a sandbox.
    pub async fn create_file(
        &self,
        path: &str,
        content: &str,
        sandbox_id: Option<&str>,
    ) -> Result<ToolOutput> {
        self.validator.validate_file_path(path).into_result("path")?;
        self.validator
            .validate_file_content(content)
            .into_result("content")?;

        let handle = self.resolve(self.config.default_file_language, sandbox_id, false).await?;
        let result = self
            .bounded(
                "write file",
                self.pool.provider().write_file(&handle.session, path, content),
            )
            .await;
        self.emit_fs(&handle.id, path, "write", Some(content.len() as u64), result.is_ok())
            .await;
        result?;

        Ok(ToolOutput::text(format!(
            "File written: {} ({} bytes)",
            path,
            content.len()
        ))
        .with_data(json!({
            "sandbox_id": handle.id.to_string(),
            "path": path,
            "size_bytes": content.len(),
        })))
    }

    /// Read a file from a sandbox.
    pub async fn read_file(&self, path: &str, sandbox_id: Option<&str>) -> Result<ToolOutput> {
        self.validator.validate_file_path(path).into_result("path")?;

        let handle = self.resolve(self.config.default_file_language, sandbox_id, false).await?;
        let result = self
            .bounded("read file", self.pool.provider().read_file(&handle.session, path))
            .await;
        let size = result.as_ref().ok().map(|c| c.len() as u64);
        self.emit_fs(&handle.id, path, "read", size, result.is_ok()).await;
        let content = result?;

        let sanitized = self.sanitizer.sanitize_report(&content);
        Ok(ToolOutput::text(sanitized.content).with_data(json!({
            "sandbox_id": handle.id.to_string(),
            "path": path,
            "size_bytes": content.len(),
            "truncated": sanitized.truncated,
            "redacted": sanitized.redacted,
        })))
    }

    /// List one directory level of a sandbox.
    pub async fn list_files(&self, path: &str, sandbox_id: Option<&str>) -> Result<ToolOutput> {
        self.validator.validate_file_path(path).into_result("path")?;

        let handle = self.resolve(self.config.default_file_language, sandbox_id, false).await?;
        let result = self
            .bounded(
                "list directory",
                self.pool.provider().list_directory(&handle.session, path),
            )
            .await;
        self.emit_fs(&handle.id, path, "list", None, result.is_ok()).await;
        let entries = result?;

        let listing = if entries.is_empty() {
            format!("{} is empty", path)
        } else {
            render_listing(&entries)
        };
        let sanitized = self.sanitizer.sanitize(&listing);
        Ok(ToolOutput::text(sanitized).with_data(json!({
            "sandbox_id": handle.id.to_string(),
            "path": path,
            "count": entries.len(),
            "entries": entries,
        })))
    }

    /// Install packages with the language's package manager.
    pub async fn install_packages(
        &self,
        packages: &[String],
        language: Language,
        sandbox_id: Option<&str>,
    ) -> Result<ToolOutput> {
        self.validator
            .validate_packages(packages, language)
            .into_result("packages")?;

        let handle = self.resolve(language, sandbox_id, true).await?;
        let script = install_script(language, packages)?;
        tracing::info!(
            sandbox_id = %handle.id,
            manager = language.package_manager(),
            packages = ?packages,
            "Installing packages"
        );

        let started = Instant::now();
        let execution = self.run_code(&handle, &script).await?;
        let elapsed = started.elapsed();

        let mut output = self.execution_output(
            &handle,
            &execution,
            elapsed,
            json!({
                "packages": packages,
                "package_manager": language.package_manager(),
            }),
        );
        if output.success {
            let summary = format!(
                "Installed {} package(s) with {}: {}",
                packages.len(),
                language.package_manager(),
                packages.join(", ")
            );
            output.content = if execution.combined_output().is_empty() {
                summary
            } else {
                self.sanitizer
                    .sanitize(&format!("{}\n{}", summary, output.content))
            };
        }
        Ok(output)
    }

    /// Describe one sandbox, or all of them when no id is given.
    pub async fn sandbox_info(&self, sandbox_id: Option<&str>) -> Result<ToolOutput> {
        let Some(id) = sandbox_id else {
            let summaries = self.pool.list().await;
            let mut content = format!("{} active sandbox(es)", summaries.len());
            for s in &summaries {
                content.push_str(&format!(
                    "\n- {} ({}), created {}, idle {}s",
                    s.id,
                    s.language,
                    s.created_at.to_rfc3339(),
                    s.idle_secs
                ));
            }
            return Ok(ToolOutput::text(content).with_data(json!({
                "count": summaries.len(),
                "sandboxes": summaries,
            })));
        };

        let handle = self.lookup(id).await?;
        let file_count = match self
            .bounded(
                "list directory",
                self.pool.provider().list_directory(&handle.session, "."),
            )
            .await
        {
            Ok(entries) => Some(entries.len()),
            Err(e) => {
                tracing::warn!(sandbox_id = %handle.id, error = %e, "Could not count sandbox files");
                None
            }
        };

        let summary = handle.summary();
        let files = file_count
            .map(|n| n.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let content = format!(
            "Sandbox {}\nlanguage: {}\ncreated: {}\nlast used: {}\nfiles: {}",
            summary.id,
            summary.language,
            summary.created_at.to_rfc3339(),
            summary.last_used.to_rfc3339(),
            files
        );
        Ok(ToolOutput::text(content).with_data(json!({
            "sandbox_id": summary.id,
            "sandbox": summary,
            "file_count": file_count,
        })))
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// An explicit id must exist; for code tools it must also run `language`.
    /// Without an id, reuse or create a sandbox for `language`.
    async fn resolve(
        &self,
        language: Language,
        sandbox_id: Option<&str>,
        match_language: bool,
    ) -> Result<SandboxHandle> {
        match sandbox_id {
            Some(id) => {
                let handle = self.lookup(id).await?;
                if match_language && handle.language != language {
                    return Err(Error::LanguageMismatch {
                        id: handle.id.to_string(),
                        expected: language,
                        actual: handle.language,
                    });
                }
                Ok(handle)
            }
            None => self.pool.get_or_create(language, None).await,
        }
    }

    async fn lookup(&self, id: &str) -> Result<SandboxHandle> {
        let id = SandboxId::from(id.trim());
        self.pool
            .get(&id)
            .await
            .ok_or_else(|| Error::sandbox_not_found(id.to_string()))
    }

    async fn run_code(&self, handle: &SandboxHandle, code: &str) -> Result<Execution> {
        let timeout = self.config.timeout();
        self.bounded(
            "execution",
            self.pool
                .provider()
                .run_code(&handle.session, handle.language, code, timeout),
        )
        .await
    }

    /// Apply the execution timeout to a provider call.
    async fn bounded<T, F>(&self, op: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let timeout = self.config.timeout();
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(format!(
                "{} exceeded {}s",
                op,
                timeout.as_secs()
            ))),
        }
    }

    fn execution_output(
        &self,
        handle: &SandboxHandle,
        execution: &Execution,
        elapsed: Duration,
        extra: Value,
    ) -> ToolOutput {
        let sanitized = self.sanitizer.sanitize_report(&execution.combined_output());

        let mut data = json!({
            "sandbox_id": handle.id.to_string(),
            "language": handle.language,
            "duration_ms": elapsed.as_millis() as u64,
            "truncated": sanitized.truncated,
            "redacted": sanitized.redacted,
        });
        if let (Some(data), Value::Object(extra)) = (data.as_object_mut(), extra) {
            data.extend(extra);
        }

        match &execution.error {
            None => {
                let content = if sanitized.content.is_empty() {
                    "Execution completed with no output".to_string()
                } else {
                    sanitized.content
                };
                ToolOutput::text(content).with_data(data)
            }
            Some(error) => {
                data["error_code"] = json!("EXECUTION_ERROR");
                data["error_name"] = json!(self.sanitizer.sanitize(&error.name));
                ToolOutput::error(sanitized.content).with_data(data)
            }
        }
    }

    async fn emit<P: Serialize>(
        &self,
        event_type: EventType,
        severity: EventSeverity,
        actor: &str,
        payload: P,
    ) {
        self.event_emitter
            .emit(
                EventEnvelope::new(event_type, serde_json::to_value(payload).unwrap_or_default())
                    .with_actor(actor)
                    .with_severity(severity),
            )
            .await;
    }

    async fn emit_fs(
        &self,
        id: &SandboxId,
        path: &str,
        operation: &str,
        size_bytes: Option<u64>,
        success: bool,
    ) {
        let event_type = if operation == "write" {
            EventType::FsWrite
        } else {
            EventType::FsRead
        };
        let severity = if success {
            EventSeverity::Info
        } else {
            EventSeverity::Warning
        };
        self.emit(
            event_type,
            severity,
            "execution-gateway",
            FsPayload {
                sandbox_id: id.to_string(),
                path: path.to_string(),
                operation: operation.to_string(),
                size_bytes,
                success,
            },
        )
        .await;
    }
}

fn render_listing(entries: &[FileEntry]) -> String {
    entries
        .iter()
        .map(|e| {
            if e.is_dir {
                format!("{}/", e.name)
            } else {
                e.name.clone()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
