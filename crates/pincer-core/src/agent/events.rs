//! Canonical event protocol for the agent session.
//!
//! `Event` is the single envelope every component emits on the
//! [`EventBus`](super::event_bus::EventBus). Transport layers (TUI, HTTP/SSE
//! server) consume these events and map them to their own presentation
//! format; the core never talks to a display directly.
//!
//! Identity (`id` + `timestamp`) is assigned by the bus at emission time,
//! never by the producer. `sub_events` is an ordered list of children that
//! may be attached after the parent was emitted; attaching does not
//! re-deliver the parent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A fully stamped session event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    #[serde(flatten)]
    pub payload: EventPayload,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_events: Vec<Event>,
}

impl Event {
    /// Discriminant of this event's payload.
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

/// Everything that can happen during a session.
///
/// Each variant represents a discrete state change. Consumers must match
/// exhaustively; there is no catch-all variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    // ── Task lifecycle ─────────────────────────────────────────────────
    /// A task began executing.
    TaskStarted {
        description: String,
        working_dir: String,
    },

    /// A task finished, successfully or not.
    TaskCompleted {
        success: bool,
        duration_ms: u64,
        iterations: usize,
        summary: Option<String>,
        error: Option<String>,
    },

    /// The model produced a reasoning step.
    ThoughtGenerated { thought: String },

    // ── Tool lifecycle ─────────────────────────────────────────────────
    /// A tool call is about to be dispatched (or simulated).
    ToolExecutionStarted {
        execution_id: String,
        tool_name: String,
        display: String,
    },

    /// A tool call finished with a result or an error.
    ToolExecutionCompleted {
        execution_id: String,
        tool_name: String,
        success: bool,
        result: Option<String>,
        error: Option<String>,
        duration_ms: u64,
    },

    /// Streaming output chunk from a running tool (e.g. shell output).
    ToolExecutionOutput {
        execution_id: String,
        tool_name: String,
        chunk: String,
    },

    // ── Human-in-the-loop ──────────────────────────────────────────────
    /// A tool call requires human approval before it may execute.
    ToolConfirmationRequest {
        confirmation_id: String,
        tool_name: String,
        args: serde_json::Value,
        description: String,
        options: ConfirmationOptions,
    },

    /// A human (or the timeout fallback) resolved a confirmation.
    ToolConfirmationResponse {
        confirmation_id: String,
        approved: bool,
        choice: Option<ConfirmationChoice>,
    },

    // ── Session bookkeeping ────────────────────────────────────────────
    /// Informational notice for observers (compressions, mode notes, ...).
    SystemInfo { message: String },

    /// A workspace snapshot was recorded by the snapshot collaborator.
    SnapshotCreated {
        snapshot_id: String,
        description: String,
    },

    /// Periodic session statistics.
    SessionStats {
        message_count: usize,
        token_count: usize,
        duration_ms: u64,
    },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::TaskStarted { .. } => EventKind::TaskStarted,
            Self::TaskCompleted { .. } => EventKind::TaskCompleted,
            Self::ThoughtGenerated { .. } => EventKind::ThoughtGenerated,
            Self::ToolExecutionStarted { .. } => EventKind::ToolExecutionStarted,
            Self::ToolExecutionCompleted { .. } => EventKind::ToolExecutionCompleted,
            Self::ToolExecutionOutput { .. } => EventKind::ToolExecutionOutput,
            Self::ToolConfirmationRequest { .. } => EventKind::ToolConfirmationRequest,
            Self::ToolConfirmationResponse { .. } => EventKind::ToolConfirmationResponse,
            Self::SystemInfo { .. } => EventKind::SystemInfo,
            Self::SnapshotCreated { .. } => EventKind::SnapshotCreated,
            Self::SessionStats { .. } => EventKind::SessionStats,
        }
    }
}

/// Field-less discriminant used to key event subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    TaskStarted,
    TaskCompleted,
    ThoughtGenerated,
    ToolExecutionStarted,
    ToolExecutionCompleted,
    ToolExecutionOutput,
    ToolConfirmationRequest,
    ToolConfirmationResponse,
    SystemInfo,
    SnapshotCreated,
    SessionStats,
}

/// How a human resolved (or the timeout resolved) a confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationChoice {
    Approve,
    Deny,
    /// Approve and persist the command into the allowlist so future calls
    /// skip confirmation.
    ApproveAndRemember,
}

impl ConfirmationChoice {
    /// Whether this choice permits execution.
    pub fn is_approval(self) -> bool {
        matches!(self, Self::Approve | Self::ApproveAndRemember)
    }
}

/// Per-request confirmation behavior.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfirmationOptions {
    /// Whether the UI should offer "approve and remember".
    #[serde(default)]
    pub show_remember_option: bool,
    /// Choice applied when the request times out. `None` means deny.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_choice: Option<ConfirmationChoice>,
    /// Milliseconds to wait for a response before falling back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_serializes_with_snake_case_tag() {
        let payload = EventPayload::ToolConfirmationRequest {
            confirmation_id: "confirm-1".to_string(),
            tool_name: "shell".to_string(),
            args: serde_json::json!({ "command": "cargo build" }),
            description: "Run cargo build".to_string(),
            options: ConfirmationOptions {
                show_remember_option: true,
                default_choice: Some(ConfirmationChoice::Deny),
                timeout_ms: Some(30_000),
            },
        };

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "tool_confirmation_request");
        assert_eq!(json["options"]["default_choice"], "deny");
        assert_eq!(json["options"]["timeout_ms"], 30_000);
    }

    #[test]
    fn payload_roundtrips() {
        let payload = EventPayload::ToolExecutionCompleted {
            execution_id: "exec-1".to_string(),
            tool_name: "read_file".to_string(),
            success: true,
            result: Some("contents".to_string()),
            error: None,
            duration_ms: 12,
        };

        let json = serde_json::to_string(&payload).unwrap();
        let back: EventPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind(), EventKind::ToolExecutionCompleted);
    }

    #[test]
    fn kind_matches_variant() {
        let payload = EventPayload::SystemInfo {
            message: "hi".to_string(),
        };
        assert_eq!(payload.kind(), EventKind::SystemInfo);
    }

    #[test]
    fn approve_and_remember_counts_as_approval() {
        assert!(ConfirmationChoice::Approve.is_approval());
        assert!(ConfirmationChoice::ApproveAndRemember.is_approval());
        assert!(!ConfirmationChoice::Deny.is_approval());
    }
}
