#![forbid(unsafe_code)]

//! `kiro-bridge` — long-lived client for the Agent Communication Protocol.
//!
//! Spawns a `kiro-cli acp` child process, speaks newline-delimited JSON-RPC
//! 2.0 over its stdio, and multiplexes the single child across many
//! concurrent in-process callers. The agent's asynchronous notification
//! stream is translated into typed per-turn event sequences; incoming
//! tool-permission requests are answered by a caller-selected policy; and
//! the session identifier is persisted across restarts with a 24-hour
//! resume window.
//!
//! The crate's surface is [`client::AcpClient`]. Everything below it —
//! framing, routing, session establishment, the turn engine — is public so
//! the test suites can drive each layer over in-memory pipes.

pub mod acp;
pub mod client;
pub mod config;
pub mod errors;
pub mod models;
pub mod permission;
pub mod session;
pub mod turn;

pub use client::AcpClient;
pub use config::ClientConfig;
pub use errors::{AppError, Result};
