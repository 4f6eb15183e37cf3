//! Agent process spawner.
//!
//! Produces a running `kiro-cli acp` child whose three pipes are ready for
//! framed reads and writes, or fails cleanly:
//!
//! - The search path is the current `PATH` extended with the user shell's
//!   interactive-login `PATH` (best-effort, bounded probe) and a fixed
//!   allowlist of user-local binary directories, covering agents installed
//!   outside the `PATH` a GUI-spawned service inherits.
//! - The configured command must resolve under that path before anything
//!   is spawned; otherwise [`AppError::BinaryNotFound`] is returned and
//!   the resolved path is logged for the operator.
//! - The child gets piped stdio and `kill_on_drop(true)`.
//!
//! [`monitor_exit`] watches for process exit and runs the caller's cleanup;
//! [`drain_stderr`] forwards the agent's stderr to the diagnostic log.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{AppError, Result};

/// Ceiling on the login-shell `PATH` probe. Failures are tolerated.
const SHELL_PATH_TIMEOUT: Duration = Duration::from_millis(1_500);

/// Home-relative directories appended to the search path.
const HOME_BIN_DIRS: &[&str] = &[".local/bin", "bin", ".cargo/bin"];

/// Absolute directories appended to the search path.
const SYSTEM_BIN_DIRS: &[&str] = &["/usr/local/bin", "/opt/homebrew/bin", "/opt/homebrew/sbin"];

/// Configuration for spawning the agent process.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    /// Agent command name (e.g. `kiro-cli`), resolved on the search path.
    pub command: String,
    /// Arguments passed to the command (e.g. `["acp"]`).
    pub args: Vec<String>,
    /// Working directory the child starts in.
    pub cwd: PathBuf,
    /// When set, routes the agent's own debug logs to this file via
    /// `KIRO_LOG_FILE` / `KIRO_LOG_LEVEL`.
    pub debug_log_file: Option<PathBuf>,
}

/// A spawned agent process with its three captured pipes.
#[derive(Debug)]
pub struct AgentProcess {
    /// Child handle — kept alive so `kill_on_drop` works.
    pub child: Child,
    /// Agent stdin for outbound frames.
    pub stdin: ChildStdin,
    /// Agent stdout for inbound frames.
    pub stdout: ChildStdout,
    /// Agent stderr for the diagnostic drain.
    pub stderr: ChildStderr,
    /// Fully resolved binary path.
    pub resolved: PathBuf,
}

/// Compute the extended search path used to locate the agent binary.
///
/// Order: current `PATH`, the login shell's `PATH`, home-local binary
/// directories, then the fixed system directories — deduplicated while
/// preserving first occurrence.
pub async fn resolve_search_path() -> String {
    let mut dirs: Vec<String> = Vec::new();

    if let Ok(path) = std::env::var("PATH") {
        dirs.extend(std::env::split_paths(&path).map(|p| p.display().to_string()));
    }

    if let Some(login_path) = login_shell_path().await {
        dirs.extend(std::env::split_paths(&login_path).map(|p| p.display().to_string()));
    }

    if let Ok(home) = std::env::var("HOME") {
        for dir in HOME_BIN_DIRS {
            dirs.push(format!("{home}/{dir}"));
        }
    }
    for dir in SYSTEM_BIN_DIRS {
        dirs.push((*dir).to_owned());
    }

    let mut seen = HashSet::new();
    let deduped: Vec<String> = dirs
        .into_iter()
        .filter(|d| !d.is_empty() && seen.insert(d.clone()))
        .collect();

    deduped.join(path_separator())
}

/// Resolve `command` to an executable file under `search_path`.
///
/// A command containing a path separator is checked as given instead of
/// searched.
#[must_use]
pub fn find_in_path(command: &str, search_path: &str) -> Option<PathBuf> {
    if command.contains(std::path::MAIN_SEPARATOR) {
        let candidate = PathBuf::from(command);
        return is_executable(&candidate).then_some(candidate);
    }

    for dir in std::env::split_paths(search_path) {
        let candidate = dir.join(command);
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

/// Spawn the agent process with piped stdio.
///
/// # Errors
///
/// - [`AppError::BinaryNotFound`] — the command does not resolve on the
///   computed search path.
/// - [`AppError::Io`] — the OS spawn failed, or a pipe could not be
///   captured.
pub async fn spawn_agent(config: &SpawnConfig) -> Result<AgentProcess> {
    let search_path = resolve_search_path().await;

    let Some(resolved) = find_in_path(&config.command, &search_path) else {
        warn!(
            command = %config.command,
            search_path = %search_path,
            "agent binary not found on search path"
        );
        return Err(AppError::BinaryNotFound(format!(
            "cannot find command '{}'",
            config.command
        )));
    };

    let mut cmd = Command::new(&resolved);
    cmd.args(&config.args)
        .current_dir(&config.cwd)
        .env("PATH", &search_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(ref log_file) = config.debug_log_file {
        cmd.env("KIRO_LOG_FILE", log_file).env("KIRO_LOG_LEVEL", "debug");
    }

    let mut child = cmd
        .spawn()
        .map_err(|err| AppError::Io(format!("failed to spawn '{}': {err}", resolved.display())))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Io("failed to capture agent stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Io("failed to capture agent stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::Io("failed to capture agent stderr".into()))?;

    info!(
        pid = child.id(),
        binary = %resolved.display(),
        "agent process spawned"
    );

    Ok(AgentProcess {
        child,
        stdin,
        stdout,
        stderr,
        resolved,
    })
}

/// Spawn a background task forwarding the agent's stderr lines to the
/// diagnostic log.
#[must_use]
pub fn drain_stderr(stderr: ChildStderr, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => break,

                line = lines.next_line() => {
                    match line {
                        Ok(Some(text)) => debug!(stderr = %text, "agent diagnostic output"),
                        Ok(None) | Err(_) => break,
                    }
                }
            }
        }
    })
}

/// Spawn a background task that owns the child, awaits its exit, and runs
/// `on_exit` with a human-readable reason.
///
/// When `cancel` fires first (the disposal path, after the graceful
/// `shutdown` exchange), the task sends the termination signal to the
/// child instead and exits without reporting.
#[must_use]
pub fn monitor_exit(
    mut child: Child,
    cancel: CancellationToken,
    on_exit: impl FnOnce(&str) + Send + 'static,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            result = child.wait() => {
                let reason = match result {
                    Ok(status) => status.code().map_or_else(
                        || "process terminated by signal".to_owned(),
                        |code| format!("process exited with code {code}"),
                    ),
                    Err(err) => format!("wait error: {err}"),
                };
                warn!(reason = %reason, "agent process exited");
                on_exit(&reason);
            }
            () = cancel.cancelled() => {
                if let Err(err) = child.kill().await {
                    debug!(%err, "agent process already gone at termination");
                }
            }
        }
    })
}

// ── Private helpers ──────────────────────────────────────────────────────────

/// Query the user's shell for its interactive-login `PATH`. Best-effort:
/// any failure (no `$SHELL`, timeout, non-zero exit) returns `None`.
async fn login_shell_path() -> Option<String> {
    let shell = std::env::var("SHELL").ok()?;

    let probe = Command::new(&shell)
        .args(["-lic", r#"printf %s "$PATH""#])
        .stdin(Stdio::null())
        .output();

    let output = match tokio::time::timeout(SHELL_PATH_TIMEOUT, probe).await {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => {
            debug!(shell = %shell, %err, "login shell PATH probe failed");
            return None;
        }
        Err(_elapsed) => {
            debug!(shell = %shell, "login shell PATH probe timed out");
            return None;
        }
    };

    if !output.status.success() {
        return None;
    }

    let path = String::from_utf8_lossy(&output.stdout).trim().to_owned();
    if path.is_empty() {
        None
    } else {
        Some(path)
    }
}

fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

fn path_separator() -> &'static str {
    if cfg!(windows) {
        ";"
    } else {
        ":"
    }
}
