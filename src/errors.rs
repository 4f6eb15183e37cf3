//! Error types shared across the crate.

use std::fmt::{Display, Formatter};

/// Shared crate result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Client error enumeration covering all surfaced failure modes.
#[derive(Debug)]
pub enum AppError {
    /// The configured agent command does not resolve on the search path.
    BinaryNotFound(String),
    /// The agent process exited or errored while work was outstanding.
    ProcessExited(String),
    /// An outbound request received no response within its deadline.
    RequestTimeout(String),
    /// The agent answered a request with a JSON-RPC error object.
    Agent(String),
    /// The operation raced a client disposal in progress.
    Disposed,
    /// Frame-level failure on the agent's stdio streams.
    Codec(String),
    /// Configuration validation failure.
    Config(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BinaryNotFound(msg) => write!(f, "binary not found: {msg}"),
            Self::ProcessExited(msg) => write!(f, "agent process terminated: {msg}"),
            Self::RequestTimeout(method) => write!(f, "request timed out: {method}"),
            Self::Agent(msg) => write!(f, "agent error: {msg}"),
            Self::Disposed => write!(f, "client disposed"),
            Self::Codec(msg) => write!(f, "codec: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}
