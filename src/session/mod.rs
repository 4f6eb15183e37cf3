//! Session establishment and catalog access.
//!
//! Startup is a two-step handshake, memoized:
//!
//! 1. `initialize` with the protocol version tag and client info. Performed
//!    once per router handle (i.e. once per spawned process); completing it
//!    also installs the persistent metadata subscriber that keeps the
//!    cached context-usage record and compaction flag current.
//! 2. Session establishment — resume first. A non-expired persisted
//!    identifier is offered via `session/load`; any error clears the
//!    record and falls through to `session/new`, whose identifier is
//!    persisted. Catalogs are populated from whichever reply succeeded.
//!
//! Establishment is serialized by an async mutex so callers racing through
//! it (a warm-up, a model query, and a first prompt arriving together)
//! collapse to a single request; later callers re-check the cached state
//! after acquiring the lock and return immediately.

pub mod store;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{json, Value};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::acp::router::{AgentNotification, Router};
use crate::models::catalog::{
    CommandsReply, ContextUsage, ModeCatalog, ModelCatalog, SessionReply, SlashCommand,
};
use crate::session::store::SessionStore;
use crate::{AppError, Result};

/// Protocol version tag sent with `initialize`.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Client identity advertised in `clientInfo`.
pub const CLIENT_NAME: &str = env!("CARGO_PKG_NAME");
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// In-memory state of an established session.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub id: String,
    pub models: ModelCatalog,
    pub modes: ModeCatalog,
    /// Slash-command catalog, fetched lazily on first demand.
    pub commands: Option<Vec<SlashCommand>>,
}

/// Session state shared between the manager, the facade, and the
/// notification subscribers running on the reader task.
///
/// The subscribers execute synchronously, so everything here is guarded by
/// plain (non-async) primitives.
#[derive(Debug, Default)]
pub struct SessionShared {
    session: Mutex<Option<SessionState>>,
    usage: Mutex<ContextUsage>,
    compacting: AtomicBool,
}

impl SessionShared {
    /// Identifier of the established session, if any.
    #[must_use]
    pub fn current_session_id(&self) -> Option<String> {
        lock(&self.session).as_ref().map(|s| s.id.clone())
    }

    /// Cached model catalog (empty when no session is established).
    #[must_use]
    pub fn models(&self) -> ModelCatalog {
        lock(&self.session)
            .as_ref()
            .map(|s| s.models.clone())
            .unwrap_or_default()
    }

    /// Cached mode catalog (empty when no session is established).
    #[must_use]
    pub fn modes(&self) -> ModeCatalog {
        lock(&self.session)
            .as_ref()
            .map(|s| s.modes.clone())
            .unwrap_or_default()
    }

    /// Cached slash-command catalog, if it has been fetched.
    #[must_use]
    pub fn commands(&self) -> Option<Vec<SlashCommand>> {
        lock(&self.session).as_ref().and_then(|s| s.commands.clone())
    }

    /// Latest context-usage record.
    #[must_use]
    pub fn context_usage(&self) -> ContextUsage {
        *lock(&self.usage)
    }

    /// Record a context-usage percentage (last writer wins).
    pub fn set_context_usage(&self, percentage: f64) {
        lock(&self.usage).percentage = percentage;
    }

    /// Whether the agent reported an in-progress compaction.
    #[must_use]
    pub fn is_compacting(&self) -> bool {
        self.compacting.load(Ordering::Relaxed)
    }

    /// Set the compaction flag.
    pub fn set_compacting(&self, active: bool) {
        self.compacting.store(active, Ordering::Relaxed);
    }

    /// Install a freshly established session.
    pub fn put_session(&self, state: SessionState) {
        *lock(&self.session) = Some(state);
    }

    /// Update the cached current model identifier.
    pub fn set_current_model(&self, model_id: &str) {
        if let Some(session) = lock(&self.session).as_mut() {
            session.models.current = Some(model_id.to_owned());
        }
    }

    /// Update the cached current mode identifier.
    pub fn set_current_mode(&self, mode_id: &str) {
        if let Some(session) = lock(&self.session).as_mut() {
            session.modes.current = Some(mode_id.to_owned());
        }
    }

    /// Cache the slash-command catalog.
    pub fn put_commands(&self, commands: Vec<SlashCommand>) {
        if let Some(session) = lock(&self.session).as_mut() {
            session.commands = Some(commands);
        }
    }

    /// Drop all session state: identifier, catalogs, usage, compaction.
    pub fn reset(&self) {
        *lock(&self.session) = None;
        *lock(&self.usage) = ContextUsage::default();
        self.compacting.store(false, Ordering::Relaxed);
    }
}

/// Drives the handshake and owns catalog operations.
pub struct SessionManager {
    shared: Arc<SessionShared>,
    store: Arc<SessionStore>,
    cwd: PathBuf,
    /// Serializes initialize + session establishment across callers.
    establish: AsyncMutex<()>,
}

impl SessionManager {
    /// Create a manager over the shared state and persisted store.
    #[must_use]
    pub fn new(shared: Arc<SessionShared>, store: Arc<SessionStore>, cwd: PathBuf) -> Self {
        Self {
            shared,
            store,
            cwd,
            establish: AsyncMutex::new(()),
        }
    }

    /// Perform the `initialize` handshake if this router has not done it
    /// yet; installs the persistent metadata subscriber on success.
    ///
    /// # Errors
    ///
    /// Propagates the request's failure (`RequestTimeout`, `Agent`,
    /// `ProcessExited`).
    pub async fn ensure_initialized(&self, router: &Router) -> Result<()> {
        let _guard = self.establish.lock().await;
        self.initialize_locked(router).await
    }

    /// Establish (or return) the session, serialized across callers.
    ///
    /// # Errors
    ///
    /// Propagates the failure of `session/new`. A failed `session/load`
    /// is never surfaced — the persisted record is cleared and creation
    /// is attempted instead.
    pub async fn ensure_session(&self, router: &Router) -> Result<String> {
        let _guard = self.establish.lock().await;
        self.initialize_locked(router).await?;

        if let Some(id) = self.shared.current_session_id() {
            return Ok(id);
        }

        let cwd = self.cwd.display().to_string();

        if let Some(persisted) = self.store.load() {
            debug!(session_id = %persisted, "attempting session resume");
            let params = json!({
                "sessionId": persisted,
                "cwd": cwd,
                "mcpServers": [],
            });
            match router.request("session/load", params).await {
                Ok(reply) => return self.adopt_reply(reply, false),
                Err(err) => {
                    warn!(%err, "session resume failed; creating a new session");
                    if let Err(err) = self.store.clear() {
                        warn!(%err, "failed to clear stale session record");
                    }
                }
            }
        }

        let reply = router
            .request("session/new", json!({ "cwd": cwd, "mcpServers": [] }))
            .await?;
        self.adopt_reply(reply, true)
    }

    /// Clear in-memory session state and the persisted record. The child
    /// process stays alive; the next operation that needs a session will
    /// establish a new one.
    pub fn reset(&self) {
        self.shared.reset();
        if let Err(err) = self.store.clear() {
            warn!(%err, "failed to clear session record on reset");
        }
        info!("session state reset");
    }

    /// Cached model catalog, establishing the session first.
    ///
    /// # Errors
    ///
    /// Propagates session-establishment failures.
    pub async fn models(&self, router: &Router) -> Result<ModelCatalog> {
        self.ensure_session(router).await?;
        Ok(self.shared.models())
    }

    /// Cached mode catalog, establishing the session first.
    ///
    /// # Errors
    ///
    /// Propagates session-establishment failures.
    pub async fn modes(&self, router: &Router) -> Result<ModeCatalog> {
        self.ensure_session(router).await?;
        Ok(self.shared.modes())
    }

    /// Switch the session's model and update the cached current identifier.
    ///
    /// # Errors
    ///
    /// Propagates the request's failure; the cache is untouched on error.
    pub async fn set_model(&self, router: &Router, model_id: &str) -> Result<()> {
        let session_id = self.ensure_session(router).await?;
        router
            .request(
                "session/set_model",
                json!({ "sessionId": session_id, "modelId": model_id }),
            )
            .await?;
        self.shared.set_current_model(model_id);
        Ok(())
    }

    /// Switch the session's mode and update the cached current identifier.
    ///
    /// # Errors
    ///
    /// Propagates the request's failure; the cache is untouched on error.
    pub async fn set_mode(&self, router: &Router, mode_id: &str) -> Result<()> {
        let session_id = self.ensure_session(router).await?;
        router
            .request(
                "session/set_mode",
                json!({ "sessionId": session_id, "modeId": mode_id }),
            )
            .await?;
        self.shared.set_current_mode(mode_id);
        Ok(())
    }

    /// Slash-command catalog, fetched lazily on first demand.
    ///
    /// An agent that does not implement the method yields an empty
    /// catalog, cached like any other.
    ///
    /// # Errors
    ///
    /// Propagates failures other than "method not found".
    pub async fn commands(&self, router: &Router) -> Result<Vec<SlashCommand>> {
        let session_id = self.ensure_session(router).await?;
        if let Some(cached) = self.shared.commands() {
            return Ok(cached);
        }

        match router
            .request(
                "_kiro.dev/commands/available",
                json!({ "sessionId": session_id }),
            )
            .await
        {
            Ok(reply) => {
                let parsed: CommandsReply = serde_json::from_value(reply).unwrap_or_default();
                self.shared.put_commands(parsed.commands.clone());
                Ok(parsed.commands)
            }
            Err(AppError::Agent(msg)) if is_method_not_found(&msg) => {
                debug!("agent does not implement the command catalog");
                self.shared.put_commands(Vec::new());
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }

    /// Ask the agent to stop the current turn.
    ///
    /// Best-effort: failures are logged and swallowed, the caller's event
    /// sequence is not aborted (the agent concludes the turn shortly
    /// after), and without an established session nothing is sent.
    pub async fn cancel(&self, router: &Router) {
        let Some(session_id) = self.shared.current_session_id() else {
            debug!("cancel without a session; nothing sent");
            return;
        };
        if let Err(err) = router
            .request("session/cancel", json!({ "sessionId": session_id }))
            .await
        {
            warn!(%err, "cancel request failed");
        }
    }

    /// Execute a slash command on the session.
    ///
    /// # Errors
    ///
    /// Propagates the request's failure.
    pub async fn execute_command(&self, router: &Router, command: &str) -> Result<()> {
        let session_id = self.ensure_session(router).await?;
        router
            .request(
                "_kiro.dev/commands/execute",
                json!({ "sessionId": session_id, "command": command }),
            )
            .await?;
        Ok(())
    }

    // ── Private ──────────────────────────────────────────────────────────────

    async fn initialize_locked(&self, router: &Router) -> Result<()> {
        if router.is_initialized() {
            return Ok(());
        }

        router
            .request(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "clientInfo": { "name": CLIENT_NAME, "version": CLIENT_VERSION },
                }),
            )
            .await?;

        install_metadata_subscriber(router, &self.shared);
        router.mark_initialized();
        info!("agent initialized");
        Ok(())
    }

    fn adopt_reply(&self, reply: Value, persist: bool) -> Result<String> {
        let parsed: SessionReply = serde_json::from_value(reply)
            .map_err(|e| AppError::Agent(format!("malformed session reply: {e}")))?;

        let state = SessionState {
            id: parsed.session_id.clone(),
            models: parsed.models.unwrap_or_default().into(),
            modes: parsed.modes.unwrap_or_default().into(),
            commands: None,
        };

        if persist {
            if let Err(err) = self.store.save(&parsed.session_id) {
                warn!(%err, "failed to persist session record");
            }
        }

        self.shared.put_session(state);
        info!(session_id = %parsed.session_id, resumed = !persist, "session established");
        Ok(parsed.session_id)
    }
}

/// Register the persistent subscriber that keeps the cached context-usage
/// record and compaction flag current for the life of the connection.
pub fn install_metadata_subscriber(router: &Router, shared: &Arc<SessionShared>) {
    let shared = Arc::clone(shared);
    // Persistent: the handle is dropped on purpose; cleanup removes the
    // subscriber with the rest of the connection state.
    let _handle = router.subscribe(move |note| apply_metadata(&shared, note));
}

/// Fold one notification into the cached usage/compaction state.
///
/// Three sources feed the usage record — `kiro.dev/metadata`
/// notifications, `turn_end` session updates, and the prompt response
/// (applied by the turn engine). All are equally authoritative; the most
/// recent value wins.
pub fn apply_metadata(shared: &SessionShared, note: &AgentNotification) {
    match note.method.as_str() {
        "kiro.dev/metadata" => {
            if let Some(pct) = note
                .params
                .get("contextUsagePercentage")
                .and_then(Value::as_f64)
            {
                shared.set_context_usage(pct);
            }
        }
        "_kiro.dev/compaction/status" => {
            if let Some(status) = note.params.get("status").and_then(Value::as_str) {
                shared.set_compacting(status == "in_progress");
            }
        }
        "session/update" => {
            let update = note.params.get("update");
            let kind = update
                .and_then(|u| u.get("sessionUpdate"))
                .and_then(Value::as_str);
            if kind == Some("turn_end") {
                if let Some(pct) = update
                    .and_then(|u| u.get("contextUsage"))
                    .and_then(|c| c.get("percentage"))
                    .and_then(Value::as_f64)
                {
                    shared.set_context_usage(pct);
                }
            }
        }
        _ => {}
    }
}

// ── Private helpers ──────────────────────────────────────────────────────────

fn is_method_not_found(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("method not found") || lower.contains("-32601")
}

/// Lock a mutex, recovering the guard if a panicking holder poisoned it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
