#![deny(unused)]
//! HTTP transport for Codegate.
//!
//! Serves the registered tools over axum: listing, invocation, health
//! and Prometheus metrics.

pub mod registry;
pub mod server;

pub use registry::DefaultToolRegistry;
pub use server::{shutdown_signal, GatewayConfig, GatewayServer};
