//! Tool system: registry, result envelope, and built-in tools.

pub mod implementations;
pub mod registry;

pub use registry::{parse_params, Tool, ToolContext, ToolOutputChunk, ToolRegistry, ToolResult};
