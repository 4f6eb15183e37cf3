//! Public facade over the ACP client core.
//!
//! [`AcpClient`] owns at most one agent process at a time, spawned lazily
//! on the first operation that needs one and re-spawned after an observed
//! exit. All operations are safe to call from many tasks concurrently;
//! they coordinate through the router's pending table and the session
//! manager's establishment lock rather than caller-visible locking.
//!
//! Disposal is cooperative: a `shutdown` request under a short ceiling,
//! then the termination signal, then cleanup. Disposal tears down the
//! *connection*, not the facade — operations racing an in-progress
//! dispose fail with [`AppError::Disposed`]; the next operation after it
//! completes re-spawns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::acp::router::Router;
use crate::acp::spawner::{self, SpawnConfig};
use crate::config::ClientConfig;
use crate::models::catalog::{ContextUsage, ModeCatalog, ModelCatalog, SlashCommand};
use crate::permission::PermissionPolicy;
use crate::session::store::SessionStore;
use crate::session::{SessionManager, SessionShared};
use crate::turn::prompt::ChatRequest;
use crate::turn::{self, TurnStream};
use crate::{AppError, Result};

/// Result of [`AcpClient::test_connection`].
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionProbe {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One spawned agent process and its routing handle.
struct Connection {
    router: Router,
    cancel: tokio_util::sync::CancellationToken,
    alive: Arc<AtomicBool>,
    pid: Option<u32>,
}

/// The ACP client facade.
#[derive(Clone)]
pub struct AcpClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for AcpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcpClient").finish_non_exhaustive()
    }
}

struct ClientInner {
    config: ClientConfig,
    edits_allowed: Arc<AtomicBool>,
    shared: Arc<SessionShared>,
    store: Arc<SessionStore>,
    manager: SessionManager,
    conn: AsyncMutex<Option<Connection>>,
    disposing: AtomicBool,
}

impl AcpClient {
    /// Create a client. No process is spawned until the first operation
    /// that needs one.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] when the configuration is invalid.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let shared = Arc::new(SessionShared::default());
        let store = Arc::new(SessionStore::new(&config.state_dir));
        let manager = SessionManager::new(
            Arc::clone(&shared),
            Arc::clone(&store),
            config.cwd.clone(),
        );
        let edits_allowed = Arc::new(AtomicBool::new(config.edits_allowed));

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                edits_allowed,
                shared,
                store,
                manager,
                conn: AsyncMutex::new(None),
                disposing: AtomicBool::new(false),
            }),
        })
    }

    /// Whether agent-initiated edits are currently auto-approved.
    #[must_use]
    pub fn edits_allowed(&self) -> bool {
        self.inner.edits_allowed.load(Ordering::Relaxed)
    }

    /// Toggle the edits-allowed flag consulted by the permission policy.
    /// A single scalar read during permission handling; no locking.
    pub fn set_edits_allowed(&self, allowed: bool) {
        self.inner.edits_allowed.store(allowed, Ordering::Relaxed);
    }

    /// Run one prompt and stream its events.
    ///
    /// # Errors
    ///
    /// Fails on spawn, initialize, or session-establishment errors. Once
    /// the stream is returned, failures surface as its `error` event.
    pub async fn chat_stream(&self, request: ChatRequest) -> Result<TurnStream> {
        let router = self.ensure_connection().await?;
        let session_id = self.inner.manager.ensure_session(&router).await?;
        Ok(turn::start_turn(
            &router,
            &self.inner.shared,
            &session_id,
            &request,
        ))
    }

    /// Run one prompt and return the concatenated assistant text.
    ///
    /// # Errors
    ///
    /// As [`chat_stream`](Self::chat_stream), plus [`AppError::Agent`]
    /// when the turn ends with an `error` event.
    pub async fn chat(&self, request: ChatRequest) -> Result<String> {
        let stream = self.chat_stream(request).await?;
        turn::drain_chat(stream).await
    }

    /// Ask the agent to stop generating. Best-effort: failures are logged
    /// and swallowed, and without an established session nothing is sent.
    pub async fn cancel(&self) {
        let Some(router) = self.live_router().await else {
            debug!("cancel without a live connection; nothing sent");
            return;
        };
        self.inner.manager.cancel(&router).await;
    }

    /// Clear in-memory session state and the persisted record, keeping the
    /// child process alive.
    pub fn reset_session(&self) {
        self.inner.manager.reset();
    }

    /// Model catalog (cached after session establishment).
    ///
    /// # Errors
    ///
    /// Propagates spawn and establishment failures.
    pub async fn get_models(&self) -> Result<ModelCatalog> {
        let router = self.ensure_connection().await?;
        self.inner.manager.models(&router).await
    }

    /// Switch model.
    ///
    /// # Errors
    ///
    /// Propagates the request's failure.
    pub async fn set_model(&self, model_id: &str) -> Result<()> {
        let router = self.ensure_connection().await?;
        self.inner.manager.set_model(&router, model_id).await
    }

    /// Mode catalog (cached after session establishment).
    ///
    /// # Errors
    ///
    /// Propagates spawn and establishment failures.
    pub async fn get_modes(&self) -> Result<ModeCatalog> {
        let router = self.ensure_connection().await?;
        self.inner.manager.modes(&router).await
    }

    /// Switch mode.
    ///
    /// # Errors
    ///
    /// Propagates the request's failure.
    pub async fn set_mode(&self, mode_id: &str) -> Result<()> {
        let router = self.ensure_connection().await?;
        self.inner.manager.set_mode(&router, mode_id).await
    }

    /// Slash-command catalog (fetched lazily; empty when unsupported).
    ///
    /// # Errors
    ///
    /// Propagates failures other than "method not found".
    pub async fn get_commands(&self) -> Result<Vec<SlashCommand>> {
        let router = self.ensure_connection().await?;
        self.inner.manager.commands(&router).await
    }

    /// Execute a slash command on the session.
    ///
    /// # Errors
    ///
    /// Propagates the request's failure.
    pub async fn execute_command(&self, command: &str) -> Result<()> {
        let router = self.ensure_connection().await?;
        self.inner.manager.execute_command(&router, command).await
    }

    /// Latest cached context-usage record.
    #[must_use]
    pub fn get_context_usage(&self) -> ContextUsage {
        self.inner.shared.context_usage()
    }

    /// Whether the agent reported an in-progress compaction.
    #[must_use]
    pub fn is_compacting(&self) -> bool {
        self.inner.shared.is_compacting()
    }

    /// Spawn (if needed) and initialize the agent without establishing a
    /// session; reports whether the agent is reachable.
    pub async fn test_connection(&self) -> ConnectionProbe {
        let outcome = match self.ensure_connection().await {
            Ok(router) => self.inner.manager.ensure_initialized(&router).await,
            Err(err) => Err(err),
        };

        match outcome {
            Ok(()) => ConnectionProbe {
                ok: true,
                model: self.inner.shared.models().current,
                error: None,
            },
            Err(err) => ConnectionProbe {
                ok: false,
                model: None,
                error: Some(err.to_string()),
            },
        }
    }

    /// Tear down the agent process: `shutdown` under the configured
    /// ceiling, then the termination signal, then cleanup. Idempotent;
    /// the next operation re-spawns.
    pub async fn dispose(&self) {
        self.inner.disposing.store(true, Ordering::Release);

        let conn = self.inner.conn.lock().await.take();
        if let Some(conn) = conn {
            let shutdown = conn.router.request("shutdown", json!({}));
            match tokio::time::timeout(self.inner.config.shutdown_timeout(), shutdown).await {
                Ok(Ok(_)) => debug!("agent acknowledged shutdown"),
                Ok(Err(err)) => debug!(%err, "shutdown request failed"),
                Err(_elapsed) => debug!("shutdown request exceeded its ceiling"),
            }

            // Cancellation makes the exit monitor deliver the termination
            // signal; then drain every pending waiter and reset state.
            conn.cancel.cancel();
            conn.router.connection_lost("client disposed");
            if conn.alive.swap(false, Ordering::AcqRel) {
                self.inner.shared.reset();
                if let Err(err) = self.inner.store.clear() {
                    warn!(%err, "failed to clear session record on dispose");
                }
            }
            info!(pid = conn.pid, "agent connection disposed");
        }

        self.inner.disposing.store(false, Ordering::Release);
    }

    // ── Private ──────────────────────────────────────────────────────────────

    /// Router for the live connection, spawning the agent if necessary.
    async fn ensure_connection(&self) -> Result<Router> {
        if self.inner.disposing.load(Ordering::Acquire) {
            return Err(AppError::Disposed);
        }

        let mut slot = self.inner.conn.lock().await;

        if let Some(conn) = slot.as_ref() {
            if conn.alive.load(Ordering::Acquire) {
                return Ok(conn.router.clone());
            }
            // Dead connection left behind by the exit monitor.
            if let Some(old) = slot.take() {
                old.cancel.cancel();
            }
        }

        let conn = self.spawn_connection().await?;
        let router = conn.router.clone();
        *slot = Some(conn);
        Ok(router)
    }

    /// Router for the live connection without spawning.
    async fn live_router(&self) -> Option<Router> {
        let slot = self.inner.conn.lock().await;
        slot.as_ref()
            .filter(|conn| conn.alive.load(Ordering::Acquire))
            .map(|conn| conn.router.clone())
    }

    async fn spawn_connection(&self) -> Result<Connection> {
        let spawn_config = SpawnConfig {
            command: self.inner.config.agent_command.clone(),
            args: self.inner.config.agent_args.clone(),
            cwd: self.inner.config.cwd.clone(),
            debug_log_file: self.inner.config.debug_log_file.clone(),
        };
        let process = spawner::spawn_agent(&spawn_config).await?;
        let pid = process.child.id();

        let cancel = tokio_util::sync::CancellationToken::new();
        let alive = Arc::new(AtomicBool::new(true));
        let policy = PermissionPolicy::new(Arc::clone(&self.inner.edits_allowed));

        // Reader EOF path: the reader fails pending requests itself, so
        // this hook only resets client-level session state.
        let reader_cleanup = self.exit_cleanup(Arc::clone(&alive));
        let on_closed: Box<dyn FnOnce(&str) + Send> =
            Box::new(move |reason| reader_cleanup(reason));

        let router = Router::connect(
            process.stdout,
            process.stdin,
            policy,
            self.inner.config.request_timeout(),
            &cancel,
            Some(on_closed),
        );

        let _stderr_task = spawner::drain_stderr(process.stderr, cancel.clone());

        // Process-exit path: drain the pending table too, since the reader
        // may still be blocked on a half-open pipe.
        let monitor_router = router.clone();
        let monitor_cleanup = self.exit_cleanup(Arc::clone(&alive));
        let _monitor_task = spawner::monitor_exit(process.child, cancel.clone(), move |reason| {
            monitor_router.connection_lost(reason);
            monitor_cleanup(reason);
        });

        Ok(Connection {
            router,
            cancel,
            alive,
            pid,
        })
    }

    /// Cleanup run when the process is observed gone: mark the connection
    /// dead (so the next call re-spawns), reset session state, and drop
    /// the persisted record. Sessions cannot be reliably resumed on a
    /// replacement process.
    fn exit_cleanup(&self, alive: Arc<AtomicBool>) -> impl Fn(&str) + Send + Sync + 'static {
        let shared = Arc::clone(&self.inner.shared);
        let store = Arc::clone(&self.inner.store);
        move |reason: &str| {
            if alive.swap(false, Ordering::AcqRel) {
                debug!(reason, "running connection cleanup");
                shared.reset();
                if let Err(err) = store.clear() {
                    warn!(%err, "failed to clear session record after process loss");
                }
            }
        }
    }
}
