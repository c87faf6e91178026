//! Core traits for Codegate.
//!
//! - `skills`: Tool and ToolRegistry
//! - `events`: EventEmitter

pub mod events;
pub mod skills;

pub use events::*;
pub use skills::*;
