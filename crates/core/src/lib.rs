#![deny(unused)]
//! Core types, traits, and error definitions for Codegate.
//!
//! This crate provides the building blocks shared by the governance, sandbox
//! and gateway crates: the error type, layered configuration, the language
//! enum, tool envelopes, and lifecycle events.

pub mod config;
pub mod error;
pub mod events;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use events::*;
pub use traits::*;
pub use types::*;
