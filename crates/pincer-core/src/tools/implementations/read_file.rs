//! Read file tool

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::fs;

use crate::tools::registry::{parse_params, Tool, ToolContext, ToolResult};

pub struct ReadFileTool;

#[derive(Deserialize)]
struct Params {
    path: String,
    #[serde(default)]
    offset: Option<usize>,
    #[serde(default)]
    limit: Option<usize>,
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a text file, optionally restricted to a line range."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file, relative to the working directory"
                },
                "offset": {
                    "type": "integer",
                    "description": "1-based first line to include"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines to return"
                }
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<Params>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };

        let path = ctx.resolve_path(&params.path);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => {
                return ToolResult::error(format!("Failed to read '{}': {}", path.display(), e))
            }
        };

        let start = params.offset.unwrap_or(1).saturating_sub(1);
        let selected: Vec<&str> = match params.limit {
            Some(limit) => content.lines().skip(start).take(limit).collect(),
            None => content.lines().skip(start).collect(),
        };

        ToolResult::success(selected.join("\n"))
    }
}
