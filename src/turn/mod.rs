//! Turn engine.
//!
//! One turn is one `session/prompt` round-trip. While it runs, an
//! ephemeral subscriber at the router translates inbound notifications
//! into [`TurnEvent`]s and pushes them onto a single-consumer channel;
//! the prompt's own outcome appends the terminal `done` / `error`. The
//! caller drains the channel through [`TurnStream`], which ends after the
//! first terminal event and removes the subscriber on termination —
//! normal or abnormal.
//!
//! Within a turn, events are observed in the exact order the subscriber
//! pushed them, interleaved only with the terminal event.

pub mod prompt;

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::debug;

use crate::acp::router::{AgentNotification, Router, SubscriberHandle};
use crate::models::event::{ToolLocation, TurnEvent};
use crate::session::SessionShared;
use crate::turn::prompt::{assemble_prompt, ChatRequest};
use crate::{AppError, Result};

/// Translate one inbound notification into a turn event.
///
/// Returns `None` for notifications with no user-visible rendering:
/// unknown methods, unknown session-update kinds, `turn_end` (cached by
/// the metadata subscriber only), empty message chunks, and metadata
/// notifications without a usage percentage.
#[must_use]
pub fn translate(note: &AgentNotification) -> Option<TurnEvent> {
    match note.method.as_str() {
        "session/update" => translate_update(note.params.get("update")?),
        "kiro.dev/metadata" => note
            .params
            .get("contextUsagePercentage")
            .and_then(Value::as_f64)
            .map(|percentage| TurnEvent::ContextUsage { percentage }),
        "_kiro.dev/compaction/status" => note
            .params
            .get("status")
            .and_then(Value::as_str)
            .map(|status| TurnEvent::Compaction {
                status: status.to_owned(),
            }),
        _ => None,
    }
}

/// Start a turn: install the ephemeral subscriber, issue `session/prompt`,
/// and return the event stream.
///
/// The prompt request runs on its own task so the caller can begin
/// draining events immediately; its outcome becomes the stream's terminal
/// event. A response carrying `contextUsage` updates the cached record and
/// yields a `context_usage` event just before `done`.
#[must_use]
pub fn start_turn(
    router: &Router,
    shared: &Arc<SessionShared>,
    session_id: &str,
    request: &ChatRequest,
) -> TurnStream {
    let blocks = assemble_prompt(request);
    let (tx, rx) = mpsc::unbounded_channel();

    let subscriber_tx = tx.clone();
    let handle = router.subscribe(move |note| {
        if let Some(event) = translate(note) {
            let _ = subscriber_tx.send(event);
        }
    });

    let params = json!({ "sessionId": session_id, "prompt": blocks });
    let prompt_router = router.clone();
    let prompt_shared = Arc::clone(shared);
    tokio::spawn(async move {
        match prompt_router.request("session/prompt", params).await {
            Ok(result) => {
                if let Some(pct) = result
                    .get("contextUsage")
                    .and_then(|c| c.get("percentage"))
                    .and_then(Value::as_f64)
                {
                    prompt_shared.set_context_usage(pct);
                    let _ = tx.send(TurnEvent::ContextUsage { percentage: pct });
                }
                let _ = tx.send(TurnEvent::Done);
            }
            Err(err) => {
                let text = match err {
                    AppError::Agent(message) => message,
                    other => other.to_string(),
                };
                let _ = tx.send(TurnEvent::Error { text });
            }
        }
    });

    TurnStream {
        rx,
        done: false,
        subscription: SubscriptionGuard {
            router: router.clone(),
            handle: Some(handle),
        },
    }
}

/// Drain a turn into the concatenated assistant text.
///
/// # Errors
///
/// Returns [`AppError::Agent`] carrying the `error` event's text when the
/// turn fails.
pub async fn drain_chat(mut stream: TurnStream) -> Result<String> {
    let mut out = String::new();
    while let Some(event) = stream.next_event().await {
        match event {
            TurnEvent::Token { text } => out.push_str(&text),
            TurnEvent::Error { text } => return Err(AppError::Agent(text)),
            _ => {}
        }
    }
    Ok(out)
}

// ── TurnStream ───────────────────────────────────────────────────────────────

/// Lazy sequence of one turn's events.
///
/// Finite: ends after the first `done` or `error`. The ephemeral
/// subscriber is removed when the terminal event is observed, or when the
/// stream is dropped early.
pub struct TurnStream {
    rx: mpsc::UnboundedReceiver<TurnEvent>,
    done: bool,
    subscription: SubscriptionGuard,
}

impl TurnStream {
    /// Receive the next event; `None` once the turn has terminated.
    pub async fn next_event(&mut self) -> Option<TurnEvent> {
        if self.done {
            return None;
        }
        let event = self.rx.recv().await?;
        if event.is_terminal() {
            self.done = true;
            self.subscription.release();
        }
        Some(event)
    }
}

impl Stream for TurnStream {
    type Item = TurnEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                if event.is_terminal() {
                    this.done = true;
                    this.subscription.release();
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Removes the ephemeral subscriber exactly once.
struct SubscriptionGuard {
    router: Router,
    handle: Option<SubscriberHandle>,
}

impl SubscriptionGuard {
    fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.router.unsubscribe(handle);
            debug!("turn subscriber removed");
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.release();
    }
}

// ── Private helpers ──────────────────────────────────────────────────────────

fn translate_update(update: &Value) -> Option<TurnEvent> {
    let kind = update.get("sessionUpdate").and_then(Value::as_str)?;
    match kind {
        "agent_message_chunk" => {
            let text = update
                .get("content")
                .and_then(|c| c.get("text"))
                .and_then(Value::as_str)
                .or_else(|| update.get("text").and_then(Value::as_str))?;
            if text.is_empty() {
                return None;
            }
            Some(TurnEvent::Token {
                text: text.to_owned(),
            })
        }
        "tool_call" => Some(TurnEvent::ToolCall {
            id: str_field(update, "toolCallId"),
            title: str_field(update, "title"),
            kind: str_field(update, "kind"),
            status: "running".to_owned(),
        }),
        "tool_call_update" => {
            let locations = update
                .get("locations")
                .and_then(|v| serde_json::from_value::<Vec<ToolLocation>>(v.clone()).ok());
            Some(TurnEvent::ToolCallUpdate {
                id: str_field(update, "toolCallId"),
                title: str_field(update, "title"),
                status: update
                    .get("status")
                    .and_then(Value::as_str)
                    .unwrap_or("running")
                    .to_owned(),
                locations,
            })
        }
        "tool_result" => Some(TurnEvent::ToolResult {
            id: str_field(update, "toolCallId"),
            title: str_field(update, "title"),
            status: "done".to_owned(),
        }),
        // Cached by the metadata subscriber; no user-visible event.
        "turn_end" => None,
        other => {
            debug!(kind = other, "unknown session update kind, skipping");
            None
        }
    }
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}
