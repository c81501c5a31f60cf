//! Shell tool - execute commands with real-time output streaming

use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::tools::registry::{parse_params, Tool, ToolContext, ToolOutputChunk, ToolResult};

const MAX_OUTPUT_BYTES: usize = 50_000;

pub struct ShellTool;

#[derive(Deserialize)]
struct Params {
    command: String,
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the working directory and return its combined output."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The command to execute"
                }
            },
            "required": ["command"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<Params>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };

        let mut child = match Command::new("sh")
            .arg("-c")
            .arg(&params.command)
            .current_dir(&ctx.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => return ToolResult::error(format!("Failed to spawn command: {}", e)),
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let mut output = String::new();
        let mut stdout_lines = stdout.map(|s| BufReader::new(s).lines());
        let mut stderr_lines = stderr.map(|s| BufReader::new(s).lines());

        while stdout_lines.is_some() || stderr_lines.is_some() {
            let line = tokio::select! {
                line = next_line(&mut stdout_lines) => line,
                line = next_line(&mut stderr_lines) => line,
            };
            let Some(line) = line else { continue };

            if output.len() < MAX_OUTPUT_BYTES {
                output.push_str(&line);
                output.push('\n');
            }
            if let Some(tx) = &ctx.output_tx {
                let _ = tx.send(ToolOutputChunk {
                    chunk: line,
                    is_complete: false,
                });
            }
        }

        let status = match child.wait().await {
            Ok(status) => status,
            Err(e) => return ToolResult::error(format!("Failed to wait for command: {}", e)),
        };

        if let Some(tx) = &ctx.output_tx {
            let _ = tx.send(ToolOutputChunk {
                chunk: String::new(),
                is_complete: true,
            });
        }

        let exit_code = status.code().unwrap_or(-1);
        if status.success() {
            ToolResult::success(output)
        } else {
            ToolResult::error_with_code(
                "command_failed",
                format!("Command exited with code {}:\n{}", exit_code, output),
            )
        }
    }
}

/// Next line from an optional line reader; `None` once the stream ends.
async fn next_line<R>(lines: &mut Option<tokio::io::Lines<BufReader<R>>>) -> Option<String>
where
    R: tokio::io::AsyncRead + Unpin,
{
    match lines {
        Some(reader) => match reader.next_line().await {
            Ok(Some(line)) => Some(line),
            _ => {
                *lines = None;
                None
            }
        },
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn captures_command_output() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(dir.path().to_path_buf());

        let result = ShellTool
            .execute(json!({ "command": "echo hello" }), &ctx)
            .await;

        assert!(!result.is_error);
        assert_eq!(result.output.trim(), "hello");
    }

    #[tokio::test]
    async fn nonzero_exit_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(dir.path().to_path_buf());

        let result = ShellTool
            .execute(json!({ "command": "exit 3" }), &ctx)
            .await;

        assert!(result.is_error);
        let parsed: Value = serde_json::from_str(&result.output).unwrap();
        assert_eq!(parsed["error"]["code"], "command_failed");
    }

    #[tokio::test]
    async fn streams_chunks_when_channel_provided() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = ToolContext::new(dir.path().to_path_buf()).with_output_stream(tx);

        let result = ShellTool
            .execute(json!({ "command": "printf 'a\\nb\\n'" }), &ctx)
            .await;
        assert!(!result.is_error);

        let mut chunks = Vec::new();
        while let Ok(chunk) = rx.try_recv() {
            chunks.push(chunk);
        }
        assert!(chunks.iter().any(|c| c.chunk == "a"));
        assert!(chunks.last().map(|c| c.is_complete).unwrap_or(false));
    }
}
