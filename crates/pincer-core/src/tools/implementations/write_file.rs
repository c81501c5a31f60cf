//! Write file tool - create or overwrite files

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::fs;

use crate::tools::registry::{parse_params, Tool, ToolContext, ToolResult};

pub struct WriteFileTool;

#[derive(Deserialize)]
struct Params {
    path: String,
    content: String,
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Create or overwrite a file. Creates parent directories if needed."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file, relative to the working directory"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write"
                }
            },
            "required": ["path", "content"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<Params>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };

        let path = ctx.resolve_path(&params.path);

        if let Some(parent) = path.parent().filter(|p| !p.exists()) {
            if let Err(e) = fs::create_dir_all(parent).await {
                return ToolResult::error(format!(
                    "Failed to create directory '{}': {}",
                    parent.display(),
                    e
                ));
            }
        }

        match fs::write(&path, &params.content).await {
            Ok(()) => {
                tracing::info!(path = %path.display(), bytes = params.content.len(), "wrote file");
                ToolResult::success_data(json!({
                    "path": path.display().to_string(),
                    "bytes": params.content.len(),
                }))
            }
            Err(e) => ToolResult::error(format!("Failed to write '{}': {}", path.display(), e)),
        }
    }
}
