//! Client configuration.
//!
//! The surrounding service constructs a [`ClientConfig`] programmatically
//! (or deserialises one from its own settings store) and hands it to
//! [`AcpClient::new`](crate::client::AcpClient::new). Timeouts carry serde
//! defaults so a partial configuration stays valid.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Configuration for the ACP client.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ClientConfig {
    /// Agent binary command name (resolved on the computed search path).
    #[serde(default = "default_agent_command")]
    pub agent_command: String,
    /// Arguments passed to the agent binary.
    #[serde(default = "default_agent_args")]
    pub agent_args: Vec<String>,
    /// Working directory handed to the agent at session creation.
    pub cwd: PathBuf,
    /// Directory holding the persisted session record.
    pub state_dir: PathBuf,
    /// Initial value of the edits-allowed flag consulted by the
    /// permission policy. Toggleable at runtime on the client.
    #[serde(default)]
    pub edits_allowed: bool,
    /// Per-request response deadline.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Ceiling on the graceful `shutdown` exchange during disposal.
    #[serde(default = "default_shutdown_timeout_millis")]
    pub shutdown_timeout_millis: u64,
    /// When set, the agent is spawned with `KIRO_LOG_FILE` pointing here
    /// and `KIRO_LOG_LEVEL=debug` so its internal logs land in one place.
    #[serde(default)]
    pub debug_log_file: Option<PathBuf>,
}

fn default_agent_command() -> String {
    "kiro-cli".into()
}

fn default_agent_args() -> Vec<String> {
    vec!["acp".into()]
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_shutdown_timeout_millis() -> u64 {
    2_000
}

impl ClientConfig {
    /// Build a configuration with defaults for everything but the two
    /// required directories.
    #[must_use]
    pub fn new(cwd: PathBuf, state_dir: PathBuf) -> Self {
        Self {
            agent_command: default_agent_command(),
            agent_args: default_agent_args(),
            cwd,
            state_dir,
            edits_allowed: false,
            request_timeout_secs: default_request_timeout_secs(),
            shutdown_timeout_millis: default_shutdown_timeout_millis(),
            debug_log_file: None,
        }
    }

    /// Per-request response deadline as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Disposal shutdown ceiling as a [`Duration`].
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_millis)
    }

    /// Validate field-level invariants that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when the agent command is empty or the
    /// request timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if self.agent_command.trim().is_empty() {
            return Err(AppError::Config("agent_command must not be empty".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(AppError::Config("request_timeout_secs must be positive".into()));
        }
        Ok(())
    }
}
