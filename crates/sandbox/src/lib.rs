#![deny(unused)]
//! Remote sandbox execution for Codegate.
//!
//! This crate owns everything between a tool call and the remote sandbox
//! service: the provider abstraction, the pool of live sandboxes, and the
//! execution gateway that validates, runs and sanitizes each call.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────┐
//! │  Tools (execute_python, create_file…)  │
//! │    ↓ typed arguments                   │
//! ├────────────────────────────────────────┤
//! │  ExecutionGateway                      │
//! │    validate → resolve → call → sanitize│
//! ├────────────────────────────────────────┤
//! │  SandboxPool (+ PoolLifecycle sweeper) │
//! │    ↓ SandboxProvider                   │
//! ├────────────────────────────────────────┤
//! │  RemoteSandbox (HTTPS, X-API-Key)      │
//! └────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use codegate_sandbox::{ExecutionGateway, PoolLifecycle, RemoteSandbox, SandboxPool};
//!
//! let provider = Arc::new(RemoteSandbox::new(&config.provider, api_key)?);
//! let pool = Arc::new(SandboxPool::new(provider, config.pool.clone()));
//! let lifecycle = PoolLifecycle::new(pool.clone());
//! lifecycle.start().await;
//!
//! let gateway = Arc::new(ExecutionGateway::new(pool, validator, sanitizer, config.execution.clone()));
//! for tool in codegate_sandbox::tools::all_tools(gateway) {
//!     registry.register(tool).await?;
//! }
//! ```

pub mod gateway;
pub mod lifecycle;
pub mod mock;
pub mod pool;
pub mod provider;
pub mod remote;
pub mod tools;

pub use gateway::ExecutionGateway;
pub use lifecycle::PoolLifecycle;
pub use mock::MockSandbox;
pub use pool::{DrainReport, SandboxHandle, SandboxPool, SandboxSummary, TerminationReason};
pub use provider::{Execution, ExecutionError, ExecutionResult, FileEntry, SandboxId, SandboxProvider};
pub use remote::RemoteSandbox;
pub use tools::{
    all_tools, install_script, CreateFileTool, ExecuteCodeTool, InstallPackagesTool, ListFilesTool,
    ReadFileTool, SandboxInfoTool, TOOL_NAMES,
};
