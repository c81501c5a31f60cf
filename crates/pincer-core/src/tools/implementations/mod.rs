//! Built-in tool implementations.

pub mod read_file;
pub mod shell;
pub mod write_file;

pub use read_file::ReadFileTool;
pub use shell::ShellTool;
pub use write_file::WriteFileTool;

use std::sync::Arc;

use crate::tools::registry::ToolRegistry;

/// Register all built-in tools.
pub async fn register_all_tools(registry: &ToolRegistry) {
    registry.register(Arc::new(ReadFileTool)).await;
    registry.register(Arc::new(WriteFileTool)).await;
    registry.register(Arc::new(ShellTool)).await;
}
