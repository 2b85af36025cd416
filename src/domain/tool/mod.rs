//! Tool domain - the operation contract workflows invoke
//!
//! A tool is an opaque `(parameters) -> result` callable registered by name.
//! Everything domain-specific lives behind this seam.

mod contract;
mod error;

pub use contract::{FnTool, Tool};
pub use error::ToolError;
