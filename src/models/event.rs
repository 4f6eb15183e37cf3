//! Typed turn events yielded to callers.
//!
//! A turn's event sequence is finite; the last event is exactly one of
//! [`TurnEvent::Done`] or [`TurnEvent::Error`], and nothing follows it.
//! The enum serialises with a `type` tag so the surrounding service can
//! forward events verbatim over its SSE transport.

use serde::{Deserialize, Serialize};

/// A location a tool call touched, as reported by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolLocation {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u64>,
}

/// One event in a turn's lazy sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// A chunk of assistant text.
    Token { text: String },
    /// A tool call has started; `status` is always `"running"`.
    ToolCall {
        id: String,
        title: String,
        kind: String,
        status: String,
    },
    /// Progress on a running tool call.
    ToolCallUpdate {
        id: String,
        title: String,
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        locations: Option<Vec<ToolLocation>>,
    },
    /// A tool call finished; `status` is always `"done"`.
    ToolResult {
        id: String,
        title: String,
        status: String,
    },
    /// The agent reported context-window usage.
    ContextUsage { percentage: f64 },
    /// The agent started or finished compacting its context.
    Compaction { status: String },
    /// Terminal: the prompt completed.
    Done,
    /// Terminal: the prompt failed.
    Error { text: String },
}

impl TurnEvent {
    /// Whether this event terminates the turn sequence.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error { .. })
    }
}
