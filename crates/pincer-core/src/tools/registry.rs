//! Tool registry: the execution collaborator behind the interceptor.
//!
//! Tools implement the [`Tool`] trait and return a structured [`ToolResult`]
//! envelope. The registry enforces a per-call timeout and knows nothing about
//! execution modes or approvals; that policy lives in the interceptor.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};

/// Default tool execution timeout (2 minutes)
const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(120);

/// Tool execution result
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub output: String,
    pub is_error: bool,
}

impl ToolResult {
    /// Create a success result
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
        }
    }

    /// Create a structured success envelope with `ok=true` and `data`.
    pub fn success_data(data: Value) -> Self {
        let mut envelope = serde_json::Map::new();
        envelope.insert("ok".to_string(), Value::Bool(true));
        envelope.insert("data".to_string(), data);
        Self {
            output: Value::Object(envelope).to_string(),
            is_error: false,
        }
    }

    /// Create a structured error with explicit code.
    pub fn error_with_code(code: &str, msg: impl std::fmt::Display) -> Self {
        let envelope = serde_json::json!({
            "ok": false,
            "error": { "code": code, "message": msg.to_string() }
        });
        Self {
            output: envelope.to_string(),
            is_error: true,
        }
    }

    /// Create an error result with a generic code.
    pub fn error(msg: impl std::fmt::Display) -> Self {
        Self::error_with_code("tool_error", msg)
    }

    /// Create an invalid-parameters error.
    pub fn invalid_parameters(msg: impl std::fmt::Display) -> Self {
        Self::error_with_code("invalid_parameters", msg)
    }
}

/// Parse tool parameters, returning a ToolResult error on failure
pub fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, ToolResult> {
    serde_json::from_value(params)
        .map_err(|e| ToolResult::invalid_parameters(format!("Invalid parameters: {}", e)))
}

/// Output chunk from a streaming tool (like shell)
#[derive(Debug, Clone)]
pub struct ToolOutputChunk {
    pub chunk: String,
    pub is_complete: bool,
}

/// Context for tool execution
pub struct ToolContext {
    pub working_dir: std::path::PathBuf,
    /// Optional per-call timeout override
    pub timeout: Option<Duration>,
    /// Channel for streaming output (used by the shell tool)
    pub output_tx: Option<mpsc::UnboundedSender<ToolOutputChunk>>,
}

impl Default for ToolContext {
    fn default() -> Self {
        Self {
            working_dir: std::env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from(".")),
            timeout: None,
            output_tx: None,
        }
    }
}

impl ToolContext {
    pub fn new(working_dir: std::path::PathBuf) -> Self {
        Self {
            working_dir,
            ..Default::default()
        }
    }

    /// Add streaming output channel to context
    pub fn with_output_stream(mut self, tx: mpsc::UnboundedSender<ToolOutputChunk>) -> Self {
        self.output_tx = Some(tx);
        self
    }

    /// Resolve a path relative to working directory (absolute paths pass through)
    pub fn resolve_path(&self, path: &str) -> std::path::PathBuf {
        let p = std::path::PathBuf::from(path);
        if p.is_absolute() {
            p
        } else {
            self.working_dir.join(p)
        }
    }
}

/// Trait for tool implementations
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (id)
    fn name(&self) -> &str;

    /// Tool description for AI
    fn description(&self) -> &str;

    /// JSON schema for parameters
    fn parameters_schema(&self) -> Value;

    /// Execute the tool
    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult;
}

/// Registry for managing tools with timeout enforcement
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
    default_timeout: Duration,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            default_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    /// Register a tool
    pub async fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.write().await.insert(name, tool);
    }

    /// Get a tool by name
    pub async fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().await.get(name).cloned()
    }

    /// Names of all registered tools.
    pub async fn tool_names(&self) -> Vec<String> {
        self.tools.read().await.keys().cloned().collect()
    }

    /// Execute a tool by name with timeout. Returns `None` for unknown tools.
    pub async fn execute(&self, name: &str, params: Value, ctx: &ToolContext) -> Option<ToolResult> {
        let tool = self.get(name).await?;
        let timeout = ctx.timeout.unwrap_or(self.default_timeout);

        let result = match tokio::time::timeout(timeout, tool.execute(params, ctx)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    tool = name,
                    timeout_secs = timeout.as_secs(),
                    "Tool execution timed out"
                );
                ToolResult::error_with_code(
                    "timeout",
                    format!("Tool '{}' timed out after {} seconds", name, timeout.as_secs()),
                )
            }
        };

        Some(result)
    }
}
