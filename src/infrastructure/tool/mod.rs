//! Tool registry and builtin tools

mod builtin;
mod registry;

pub use builtin::{builtin_tools, EchoTool, FailTool, HttpTool, SetTool, SleepTool};
pub use registry::{ToolInfo, ToolRegistry};
