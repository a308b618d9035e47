//! Engine-level streaming events.
//!
//! `StreamEvent` wraps provider-level stream chunks into the fragments a
//! transport (SSE, WebSocket, CLI) forwards to clients:
//! - `content`     — partial reply text from the model
//! - `tool_call`   — the engine is invoking a tool
//! - `tool_result` — tool execution completed
//! - `usage`       — token usage metadata, forwarded as received
//! - `done`        — stream is complete
//! - `error`       — an error occurred; always the last event

use serde::{Deserialize, Serialize};

use palaver_core::provider::Usage;

/// Events emitted by the engine during streaming execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Partial reply text from the model.
    Content { delta: String },

    /// The engine is calling a tool.
    ToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// Tool execution completed.
    ToolResult {
        id: String,
        name: String,
        output: String,
        is_error: bool,
    },

    /// Token usage reported by the provider mid-stream.
    Usage { usage: Usage },

    /// The stream is complete — final metadata.
    Done {
        conversation_id: String,
        message_id: String,
        usage: Option<Usage>,
        rounds: u32,
        tool_calls_made: usize,
    },

    /// An error occurred mid-stream.
    Error { message: String },
}

impl StreamEvent {
    /// Wire event name for this event type (SSE `event:` field).
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Content { .. } => "content",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Usage { .. } => "usage",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}
