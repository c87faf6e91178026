#![deny(unused)]
//! Governance layer for the execution gateway.
//!
//! This crate provides:
//! - The pattern rule set shared by validation and sanitization
//! - Input validation for code, paths, file content and package names
//! - Output sanitization (control stripping, secret masking, truncation)
//! - Security event auditing
//! - Logging, distributed tracing and Prometheus metrics

pub mod audit;
pub mod metrics;
pub mod patterns;
pub mod sanitizer;
pub mod tracing_layer;
pub mod validator;

pub use audit::{
    InMemoryAuditor, SecurityAuditor, SecurityEvent, SecurityEventKind, TracingAuditor,
    TracingEventEmitter,
};
pub use metrics::{
    set_active_sandboxes, setup_metrics_recorder, track_sandbox_created, track_sandbox_terminated,
    track_security_event, track_tool_call,
};
pub use patterns::{rules, PatternCategory, PatternRule, RuleSet};
pub use sanitizer::{OutputSanitizer, SanitizedOutput, TRUNCATION_MARKER};
pub use tracing_layer::configure_tracing;
pub use validator::InputValidator;
