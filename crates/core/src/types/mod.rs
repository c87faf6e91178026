//! Core type definitions for Codegate.

pub mod language;
pub mod tool;
pub mod validation;

pub use language::*;
pub use tool::*;
pub use validation::*;
