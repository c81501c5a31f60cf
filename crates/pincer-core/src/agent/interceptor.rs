//! Tool interception: the gate every proposed tool call passes through.
//!
//! The interceptor reads the current execution mode, classifies the call as
//! a read or write operation, and under plan-only mode short-circuits writes
//! into a simulated result that never reaches the executor. Everything else
//! is delegated to the execution collaborator, with lifecycle events emitted
//! on the bus around the call.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::tools::registry::{ToolContext, ToolOutputChunk, ToolRegistry};

use super::classifier::CommandClassifier;
use super::event_bus::EventBus;
use super::events::EventPayload;
use super::mode::{ExecutionMode, ModeReader};

/// Tools that always mutate, regardless of arguments.
const WRITE_TOOLS: &[&str] = &["write_file", "create_file", "apply_patch"];

/// Tools that execute a single literal shell command (`command` argument).
pub(crate) const SHELL_TOOLS: &[&str] = &["shell", "bash", "execute"];

/// Tool that executes several commands in sequence (`commands` argument).
const MULTI_COMMAND_TOOL: &str = "batch";

/// A proposed tool invocation.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// Outcome of evaluating a proposed tool call.
///
/// Exactly one of `result`/`error` is set; `duration` covers entry to exit
/// regardless of which path was taken.
#[derive(Debug, Clone)]
pub struct InterceptOutcome {
    pub result: Option<String>,
    pub error: Option<String>,
    pub duration: Duration,
}

/// Execution collaborator boundary.
///
/// `output` is an optional sink for incremental output from streaming tools;
/// executors that do not stream may ignore it.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(
        &self,
        name: &str,
        args: Value,
        output: Option<mpsc::UnboundedSender<ToolOutputChunk>>,
    ) -> anyhow::Result<String>;
}

/// Gatekeeper invoked before every tool call.
pub struct ToolInterceptor {
    bus: Arc<EventBus>,
    mode: ModeReader,
    classifier: Arc<dyn CommandClassifier>,
    executor: Arc<dyn ToolExecutor>,
}

impl ToolInterceptor {
    pub fn new(
        bus: Arc<EventBus>,
        mode: ModeReader,
        classifier: Arc<dyn CommandClassifier>,
        executor: Arc<dyn ToolExecutor>,
    ) -> Self {
        Self {
            bus,
            mode,
            classifier,
            executor,
        }
    }

    /// Evaluate a proposed tool call: simulate it under plan-only mode if it
    /// is a write, otherwise delegate to the executor. Executor failures are
    /// captured into the outcome, never propagated.
    pub async fn evaluate(&self, call: &ToolCall) -> InterceptOutcome {
        let start = Instant::now();
        let execution_id = format!("exec-{}", Uuid::new_v4());

        self.bus.emit(EventPayload::ToolExecutionStarted {
            execution_id: execution_id.clone(),
            tool_name: call.name.clone(),
            display: display_for(call),
        });

        let mode = self.mode.current();
        let outcome = if mode == ExecutionMode::PlanOnly && self.is_write_operation(call) {
            // Hard invariant: the executor is never consulted on this path.
            tracing::info!(tool = %call.name, "plan-only mode: write operation simulated");
            Ok(simulate(call))
        } else {
            self.dispatch(call, &execution_id).await
        };

        let duration = start.elapsed();
        let (result, error) = match outcome {
            Ok(result) => (Some(result), None),
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "tool execution failed");
                (None, Some(e))
            }
        };

        self.bus.emit(EventPayload::ToolExecutionCompleted {
            execution_id,
            tool_name: call.name.clone(),
            success: error.is_none(),
            result: result.clone(),
            error: error.clone(),
            duration_ms: duration.as_millis() as u64,
        });

        InterceptOutcome {
            result,
            error,
            duration,
        }
    }

    async fn dispatch(&self, call: &ToolCall, execution_id: &str) -> Result<String, String> {
        let (output_tx, mut output_rx) = mpsc::unbounded_channel::<ToolOutputChunk>();

        let forwarder_bus = self.bus.clone();
        let forwarder_id = execution_id.to_string();
        let forwarder_tool = call.name.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(chunk) = output_rx.recv().await {
                if !chunk.chunk.is_empty() {
                    forwarder_bus.emit(EventPayload::ToolExecutionOutput {
                        execution_id: forwarder_id.clone(),
                        tool_name: forwarder_tool.clone(),
                        chunk: chunk.chunk,
                    });
                }
                if chunk.is_complete {
                    break;
                }
            }
        });

        let result = self
            .executor
            .execute(&call.name, call.arguments.clone(), Some(output_tx))
            .await
            .map_err(|e| e.to_string());

        let _ = forwarder.await;
        result
    }

    fn is_write_operation(&self, call: &ToolCall) -> bool {
        if WRITE_TOOLS.contains(&call.name.as_str()) {
            return true;
        }

        if SHELL_TOOLS.contains(&call.name.as_str()) {
            let command = call
                .arguments
                .get("command")
                .and_then(|v| v.as_str())
                .unwrap_or("");
            return self.classifier.is_write_operation(command);
        }

        if call.name == MULTI_COMMAND_TOOL {
            return commands_of(call)
                .iter()
                .any(|c| self.classifier.is_write_operation(c));
        }

        false
    }
}

fn commands_of(call: &ToolCall) -> Vec<String> {
    call.arguments
        .get("commands")
        .and_then(|v| v.as_array())
        .map(|list| {
            list.iter()
                .filter_map(|v| v.as_str().map(ToString::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn file_path_of(call: &ToolCall) -> Option<&str> {
    call.arguments
        .get("path")
        .or_else(|| call.arguments.get("file_path"))
        .and_then(|v| v.as_str())
}

/// Human-readable one-liner for display streams.
fn display_for(call: &ToolCall) -> String {
    if SHELL_TOOLS.contains(&call.name.as_str()) {
        let command = call
            .arguments
            .get("command")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let mut preview: String = command.chars().take(80).collect();
        if preview.len() < command.len() {
            preview.push('…');
        }
        return format!("{}: {}", call.name, preview);
    }
    match file_path_of(call) {
        Some(path) => format!("{} {}", call.name, path),
        None => call.name.clone(),
    }
}

/// Build the simulated result for a blocked write. Carries enough detail for
/// a human to approve or deny the operation without it having run.
fn simulate(call: &ToolCall) -> String {
    let impact = match call.name.as_str() {
        "write_file" | "create_file" => match file_path_of(call) {
            Some(path) => format!("would create/modify file: {}", path),
            None => "would create/modify a file".to_string(),
        },
        "apply_patch" => "would apply a patch to the workspace".to_string(),
        name if SHELL_TOOLS.contains(&name) => {
            let command = call
                .arguments
                .get("command")
                .and_then(|v| v.as_str())
                .unwrap_or("");
            format!("would execute 1 command: {}", command)
        }
        MULTI_COMMAND_TOOL => format!("would execute {} commands", commands_of(call).len()),
        _ => "would perform a write operation".to_string(),
    };

    json!({
        "simulated": true,
        "tool": call.name,
        "arguments": call.arguments,
        "message": format!(
            "Execution blocked: plan-only mode is active, so '{}' was simulated and not performed.",
            call.name
        ),
        "impact": impact,
    })
    .to_string()
}

/// Adapter making a [`ToolRegistry`] usable as the execution collaborator.
pub struct RegistryExecutor {
    registry: Arc<ToolRegistry>,
    working_dir: std::path::PathBuf,
}

impl RegistryExecutor {
    pub fn new(registry: Arc<ToolRegistry>, working_dir: std::path::PathBuf) -> Self {
        Self {
            registry,
            working_dir,
        }
    }
}

#[async_trait]
impl ToolExecutor for RegistryExecutor {
    async fn execute(
        &self,
        name: &str,
        args: Value,
        output: Option<mpsc::UnboundedSender<ToolOutputChunk>>,
    ) -> anyhow::Result<String> {
        let mut ctx = ToolContext::new(self.working_dir.clone());
        ctx.output_tx = output;

        let result = self
            .registry
            .execute(name, args, &ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Unknown tool: {}", name))?;

        if result.is_error {
            Err(anyhow::anyhow!(result.output))
        } else {
            Ok(result.output)
        }
    }
}
