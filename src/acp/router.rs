//! Full-duplex JSON-RPC dispatch.
//!
//! One [`Router`] handle exists per spawned agent process. It owns:
//!
//! - the **pending-request table** — correlation identifier → waiter, with
//!   the method name recorded for diagnostics. Identifiers are allocated
//!   from a monotonically increasing counter; entries are inserted before
//!   the frame is written and removed on response, timeout, or cleanup.
//! - the **notification subscriber set** — an ordered list of callbacks
//!   keyed by an opaque handle. Every inbound notification is delivered to
//!   every subscriber in registration order, synchronously from the reader
//!   task's perspective; subscribers must not block.
//!
//! Inbound frames are classified here: an identifier matching a live
//! pending entry is a response to us; otherwise identifier + method is an
//! incoming request (answered via the permission policy, or with an empty
//! object for unknown methods, so the agent does not stall); otherwise a
//! method alone is a notification; anything else is ignored.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::acp::codec::Frame;
use crate::acp::{reader, writer};
use crate::permission::PermissionPolicy;
use crate::{AppError, Result};

/// Capacity of the outbound frame channel feeding the writer task.
const OUTBOUND_CAPACITY: usize = 64;

/// An inbound JSON-RPC notification (method, no identifier).
#[derive(Debug, Clone)]
pub struct AgentNotification {
    pub method: String,
    pub params: Value,
}

/// Opaque handle identifying one registered notification subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberHandle(u64);

type NotificationFn = Box<dyn Fn(&AgentNotification) + Send + Sync>;

/// One live entry in the pending-request table.
struct PendingRequest {
    method: String,
    tx: oneshot::Sender<Result<Value>>,
}

struct RouterInner {
    next_id: AtomicI64,
    next_subscriber: AtomicU64,
    pending: Mutex<HashMap<i64, PendingRequest>>,
    subscribers: Mutex<Vec<(u64, NotificationFn)>>,
    outbound: mpsc::Sender<Value>,
    request_timeout: Duration,
    policy: PermissionPolicy,
    initialized: AtomicBool,
}

/// Cheaply clonable dispatch handle for one agent process.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

impl Router {
    /// Create a router writing outbound frames into `outbound`.
    #[must_use]
    pub fn new(
        outbound: mpsc::Sender<Value>,
        policy: PermissionPolicy,
        request_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                next_id: AtomicI64::new(1),
                next_subscriber: AtomicU64::new(1),
                pending: Mutex::new(HashMap::new()),
                subscribers: Mutex::new(Vec::new()),
                outbound,
                request_timeout,
                policy,
                initialized: AtomicBool::new(false),
            }),
        }
    }

    /// Wire a router over an arbitrary read/write stream pair, spawning the
    /// reader and writer tasks.
    ///
    /// `on_closed` runs after connection-lost cleanup when the read side
    /// ends (EOF or I/O error); it does not run on cancellation — the
    /// disposal path performs its own cleanup.
    pub fn connect<R, W>(
        stdout: R,
        stdin: W,
        policy: PermissionPolicy,
        request_timeout: Duration,
        cancel: &CancellationToken,
        on_closed: Option<Box<dyn FnOnce(&str) + Send>>,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let router = Self::new(tx, policy, request_timeout);
        tokio::spawn(writer::run_writer(stdin, rx, cancel.clone()));
        tokio::spawn(reader::run_reader(
            router.clone(),
            stdout,
            cancel.clone(),
            on_closed,
        ));
        router
    }

    /// Issue an outbound request and await its response.
    ///
    /// Allocates the next identifier, registers the pending entry, writes
    /// the frame, and waits up to the configured deadline.
    ///
    /// # Errors
    ///
    /// - [`AppError::RequestTimeout`] — no response within the deadline;
    ///   the pending entry is removed.
    /// - [`AppError::Agent`] — the response carried an `error` object.
    /// - [`AppError::ProcessExited`] — the connection was torn down while
    ///   the request was in flight, or the writer is already gone.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        lock(&self.inner.pending).insert(
            id,
            PendingRequest {
                method: method.to_owned(),
                tx,
            },
        );

        let frame = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        if self.inner.outbound.send(frame).await.is_err() {
            lock(&self.inner.pending).remove(&id);
            return Err(AppError::ProcessExited(format!(
                "stdin closed before '{method}' could be written"
            )));
        }

        match tokio::time::timeout(self.inner.request_timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_recv)) => Err(AppError::ProcessExited(format!(
                "request '{method}' abandoned without a response"
            ))),
            Err(_elapsed) => {
                lock(&self.inner.pending).remove(&id);
                Err(AppError::RequestTimeout(method.to_owned()))
            }
        }
    }

    /// Register a notification subscriber; returns the removal handle.
    ///
    /// The callback runs on the reader task for every inbound notification
    /// until [`unsubscribe`](Self::unsubscribe) or connection cleanup. It
    /// must not block and must not re-enter the router.
    pub fn subscribe(
        &self,
        subscriber: impl Fn(&AgentNotification) + Send + Sync + 'static,
    ) -> SubscriberHandle {
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        lock(&self.inner.subscribers).push((id, Box::new(subscriber)));
        SubscriberHandle(id)
    }

    /// Remove a subscriber by handle. Removing twice is a no-op.
    pub fn unsubscribe(&self, handle: SubscriberHandle) {
        lock(&self.inner.subscribers).retain(|(id, _)| *id != handle.0);
    }

    /// Number of live pending-request entries (diagnostics and tests).
    #[must_use]
    pub fn pending_len(&self) -> usize {
        lock(&self.inner.pending).len()
    }

    /// Number of registered notification subscribers (diagnostics and tests).
    #[must_use]
    pub fn subscriber_len(&self) -> usize {
        lock(&self.inner.subscribers).len()
    }

    /// Whether the `initialize` handshake has completed on this handle.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::Acquire)
    }

    /// Record that the `initialize` handshake completed.
    pub fn mark_initialized(&self) {
        self.inner.initialized.store(true, Ordering::Release);
    }

    /// Route one inbound frame (called by the reader task).
    pub async fn dispatch_frame(&self, frame: Frame) {
        // Response to us: identifier matching a live pending entry.
        if let Some(id) = frame.numeric_id() {
            if let Some(entry) = lock(&self.inner.pending).remove(&id) {
                let outcome = match frame.error {
                    Some(ref err) => Err(AppError::Agent(Frame::error_message(err))),
                    None => Ok(frame.result.unwrap_or(Value::Null)),
                };
                debug!(id, method = %entry.method, "response routed to waiter");
                let _ = entry.tx.send(outcome);
                return;
            }
        }

        // Incoming request from the agent: identifier + method.
        if let (Some(id), Some(method)) = (frame.id.clone(), frame.method.as_deref()) {
            let result = match method {
                "session/request_permission" => self
                    .inner
                    .policy
                    .decide(frame.params.as_ref().unwrap_or(&Value::Null)),
                other => {
                    debug!(method = other, "unknown incoming request; replying with empty result");
                    json!({})
                }
            };
            let reply = json!({ "jsonrpc": "2.0", "id": id, "result": result });
            if self.inner.outbound.send(reply).await.is_err() {
                debug!(method, "agent stdin closed; dropping incoming-request reply");
            }
            return;
        }

        // Notification: method without an identifier.
        if let Some(method) = frame.method {
            let note = AgentNotification {
                method,
                params: frame.params.unwrap_or(Value::Null),
            };
            let subscribers = lock(&self.inner.subscribers);
            for (_, subscriber) in subscribers.iter() {
                subscriber(&note);
            }
            return;
        }

        debug!("ignoring unroutable frame");
    }

    /// Tear down routing state after the connection is gone.
    ///
    /// Fails every pending request with [`AppError::ProcessExited`] and
    /// drops all subscribers. Safe to call more than once.
    pub fn connection_lost(&self, reason: &str) {
        let drained: Vec<(i64, PendingRequest)> = lock(&self.inner.pending).drain().collect();
        for (id, entry) in drained {
            warn!(id, method = %entry.method, reason, "failing pending request");
            let _ = entry.tx.send(Err(AppError::ProcessExited(format!(
                "{reason} while '{}' (id {id}) was in flight",
                entry.method
            ))));
        }
        lock(&self.inner.subscribers).clear();
    }
}

// ── Private helper ───────────────────────────────────────────────────────────

/// Lock a mutex, recovering the guard if a panicking subscriber poisoned it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
