//! Sandbox tools implementing the `Tool` trait.
//!
//! Each tool parses its JSON arguments into a typed struct and hands the call
//! to the [`ExecutionGateway`], which owns validation, sandbox resolution and
//! error handling.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use codegate_core::{traits::Tool, Error, Language, Result, ToolOutput};

use crate::gateway::ExecutionGateway;

/// Tool names in registration order.
pub const TOOL_NAMES: [&str; 7] = [
    "execute_python",
    "execute_javascript",
    "create_file",
    "read_file",
    "list_files",
    "install_packages",
    "get_sandbox_info",
];

/// Build all seven tools over one gateway.
pub fn all_tools(gateway: Arc<ExecutionGateway>) -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(ExecuteCodeTool::new(gateway.clone(), Language::Python)),
        Box::new(ExecuteCodeTool::new(gateway.clone(), Language::JavaScript)),
        Box::new(CreateFileTool::new(gateway.clone())),
        Box::new(ReadFileTool::new(gateway.clone())),
        Box::new(ListFilesTool::new(gateway.clone())),
        Box::new(InstallPackagesTool::new(gateway.clone())),
        Box::new(SandboxInfoTool::new(gateway)),
    ]
}

fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T> {
    serde_json::from_value(args)
        .map_err(|e| Error::invalid_request(format!("Invalid arguments: {}", e)))
}

// =============================================================================
// Install Script
// =============================================================================

/// Script that installs `packages` from inside the sandbox.
///
/// Names are embedded as JSON string literals, which both Python and
/// JavaScript parse verbatim, and handed to the package manager as an argument
/// vector so no shell ever sees them.
pub fn install_script(language: Language, packages: &[String]) -> Result<String> {
    let args = packages
        .iter()
        .map(serde_json::to_string)
        .collect::<std::result::Result<Vec<_>, _>>()?
        .join(", ");

    let script = match language {
        Language::Python => format!(
            r#"import subprocess
import sys

result = subprocess.run(
    [sys.executable, "-m", "pip", "install", "--disable-pip-version-check", {args}],
    capture_output=True,
    text=True,
)
if result.stdout:
    print(result.stdout, end="")
if result.stderr:
    print(result.stderr, end="", file=sys.stderr)
if result.returncode != 0:
    raise RuntimeError(f"pip install exited with status {{result.returncode}}")
"#
        ),
        Language::JavaScript => format!(
            r#"const {{ spawnSync }} = require("child_process");

const result = spawnSync("npm", ["install", "--no-fund", "--no-audit", {args}], {{ encoding: "utf8" }});
if (result.stdout) process.stdout.write(result.stdout);
if (result.stderr) process.stderr.write(result.stderr);
if (result.error) throw result.error;
if (result.status !== 0) throw new Error(`npm install exited with status ${{result.status}}`);
"#
        ),
    };
    Ok(script)
}

// =============================================================================
// Execute Code Tools
// =============================================================================

#[derive(Debug, Deserialize)]
struct ExecuteArgs {
    code: String,
    #[serde(default)]
    sandbox_id: Option<String>,
}

/// `execute_python` / `execute_javascript`.
pub struct ExecuteCodeTool {
    gateway: Arc<ExecutionGateway>,
    language: Language,
}

impl ExecuteCodeTool {
    pub fn new(gateway: Arc<ExecutionGateway>, language: Language) -> Self {
        Self { gateway, language }
    }
}

#[async_trait]
impl Tool for ExecuteCodeTool {
    fn name(&self) -> &str {
        match self.language {
            Language::Python => "execute_python",
            Language::JavaScript => "execute_javascript",
        }
    }

    fn description(&self) -> &str {
        match self.language {
            Language::Python => {
                "Execute Python code in an isolated remote sandbox. \
                 Returns stdout, stderr, rich results and any raised error."
            }
            Language::JavaScript => {
                "Execute JavaScript (Node.js) code in an isolated remote sandbox. \
                 Returns stdout, stderr, rich results and any thrown error."
            }
        }
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": format!("The {} code to execute", self.language)
                },
                "sandbox_id": {
                    "type": "string",
                    "description": "Existing sandbox to run in. Omit to reuse or create one."
                }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput> {
        Ok(self
            .gateway
            .run(self.name(), async {
                let args: ExecuteArgs = parse_args(args)?;
                self.gateway
                    .execute_code(self.language, &args.code, args.sandbox_id.as_deref())
                    .await
            })
            .await)
    }
}

// =============================================================================
// File Tools
// =============================================================================

#[derive(Debug, Deserialize)]
struct CreateFileArgs {
    path: String,
    content: String,
    #[serde(default)]
    sandbox_id: Option<String>,
}

pub struct CreateFileTool {
    gateway: Arc<ExecutionGateway>,
}

impl CreateFileTool {
    pub fn new(gateway: Arc<ExecutionGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Tool for CreateFileTool {
    fn name(&self) -> &str {
        "create_file"
    }

    fn description(&self) -> &str {
        "Create or overwrite a file inside a sandbox."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path inside the sandbox (e.g. 'main.py', 'src/app.js')"
                },
                "content": {
                    "type": "string",
                    "description": "The file content to write"
                },
                "sandbox_id": {
                    "type": "string",
                    "description": "Existing sandbox to write to"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput> {
        Ok(self
            .gateway
            .run(self.name(), async {
                let args: CreateFileArgs = parse_args(args)?;
                self.gateway
                    .create_file(&args.path, &args.content, args.sandbox_id.as_deref())
                    .await
            })
            .await)
    }
}

#[derive(Debug, Deserialize)]
struct ReadFileArgs {
    path: String,
    #[serde(default)]
    sandbox_id: Option<String>,
}

pub struct ReadFileTool {
    gateway: Arc<ExecutionGateway>,
}

impl ReadFileTool {
    pub fn new(gateway: Arc<ExecutionGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the content of a file from a sandbox."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path inside the sandbox"
                },
                "sandbox_id": {
                    "type": "string",
                    "description": "Existing sandbox to read from"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput> {
        Ok(self
            .gateway
            .run(self.name(), async {
                let args: ReadFileArgs = parse_args(args)?;
                self.gateway
                    .read_file(&args.path, args.sandbox_id.as_deref())
                    .await
            })
            .await)
    }
}

fn default_list_path() -> String {
    ".".to_string()
}

#[derive(Debug, Deserialize)]
struct ListFilesArgs {
    #[serde(default = "default_list_path")]
    path: String,
    #[serde(default)]
    sandbox_id: Option<String>,
}

pub struct ListFilesTool {
    gateway: Arc<ExecutionGateway>,
}

impl ListFilesTool {
    pub fn new(gateway: Arc<ExecutionGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List files and directories at a path inside a sandbox."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to list",
                    "default": "."
                },
                "sandbox_id": {
                    "type": "string",
                    "description": "Existing sandbox to inspect"
                }
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput> {
        // A bare call with no arguments lists the working directory.
        let args = if args.is_null() { json!({}) } else { args };
        Ok(self
            .gateway
            .run(self.name(), async {
                let args: ListFilesArgs = parse_args(args)?;
                self.gateway
                    .list_files(&args.path, args.sandbox_id.as_deref())
                    .await
            })
            .await)
    }
}

// =============================================================================
// Package Tool
// =============================================================================

#[derive(Debug, Deserialize)]
struct InstallPackagesArgs {
    packages: Vec<String>,
    language: String,
    #[serde(default)]
    sandbox_id: Option<String>,
}

pub struct InstallPackagesTool {
    gateway: Arc<ExecutionGateway>,
}

impl InstallPackagesTool {
    pub fn new(gateway: Arc<ExecutionGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Tool for InstallPackagesTool {
    fn name(&self) -> &str {
        "install_packages"
    }

    fn description(&self) -> &str {
        "Install packages into a sandbox with pip (python) or npm (javascript)."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "packages": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Package names, optionally with version specifiers"
                },
                "language": {
                    "type": "string",
                    "enum": ["python", "javascript"],
                    "description": "Selects the package manager"
                },
                "sandbox_id": {
                    "type": "string",
                    "description": "Existing sandbox to install into"
                }
            },
            "required": ["packages", "language"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput> {
        Ok(self
            .gateway
            .run(self.name(), async {
                let args: InstallPackagesArgs = parse_args(args)?;
                let language: Language = args.language.parse()?;
                self.gateway
                    .install_packages(&args.packages, language, args.sandbox_id.as_deref())
                    .await
            })
            .await)
    }
}

// =============================================================================
// Info Tool
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct SandboxInfoArgs {
    #[serde(default)]
    sandbox_id: Option<String>,
}

pub struct SandboxInfoTool {
    gateway: Arc<ExecutionGateway>,
}

impl SandboxInfoTool {
    pub fn new(gateway: Arc<ExecutionGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Tool for SandboxInfoTool {
    fn name(&self) -> &str {
        "get_sandbox_info"
    }

    fn description(&self) -> &str {
        "Describe one sandbox (language, age, last use, file count), or list every active sandbox."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "sandbox_id": {
                    "type": "string",
                    "description": "Sandbox to describe. Omit to list all."
                }
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput> {
        Ok(self
            .gateway
            .run(self.name(), async {
                let args: SandboxInfoArgs = if args.is_null() {
                    SandboxInfoArgs::default()
                } else {
                    parse_args(args)?
                };
                self.gateway.sandbox_info(args.sandbox_id.as_deref()).await
            })
            .await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_install_script_quotes_names() {
        let script = install_script(
            Language::Python,
            &["requests==2.31.0".to_string(), "numpy".to_string()],
        )
        .unwrap();
        assert!(script.contains(r#""install", "--disable-pip-version-check", "requests==2.31.0", "numpy"]"#));
        assert!(script.contains("sys.executable"));
        assert!(script.contains("{result.returncode}"));
    }

    #[test]
    fn test_javascript_install_script() {
        let script = install_script(Language::JavaScript, &["@types/node".to_string()]).unwrap();
        assert!(script.contains(r#"["install", "--no-fund", "--no-audit", "@types/node"]"#));
        assert!(script.contains("const { spawnSync }"));
        assert!(script.contains("${result.status}"));
    }

    #[test]
    fn test_parse_args_reports_missing_field() {
        let err = parse_args::<ExecuteArgs>(json!({"sandbox_id": "x"})).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
        assert!(err.to_string().contains("code"));

        let err = parse_args::<ExecuteArgs>(json!({"code": 42})).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn test_list_args_default_path() {
        let args: ListFilesArgs = parse_args(json!({})).unwrap();
        assert_eq!(args.path, ".");
        assert!(args.sandbox_id.is_none());
    }
}
