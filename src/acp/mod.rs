//! Agent Communication Protocol (ACP) stream handling.
//!
//! This module manages bidirectional NDJSON JSON-RPC communication with the
//! spawned agent process. One child process carries one [`router::Router`]
//! handle; the router owns the pending-request table and the notification
//! subscriber set, and a pair of read/write tasks moves frames between the
//! router and the child's stdio.
//!
//! # Submodules
//!
//! - [`codec`]: [`tokio_util::codec::LinesCodec`]-based NDJSON framing and
//!   structural frame parsing. No line-length limit; the agent is a local,
//!   trusted process.
//! - [`spawner`]: search-path resolution, process spawning with stdio
//!   capture, stderr draining, and exit monitoring.
//! - [`router`]: full-duplex dispatch — outbound requests with deadlines,
//!   response correlation, notification fan-out, incoming-request replies.
//! - [`reader`]: async read task feeding decoded frames to the router.
//! - [`writer`]: async write task serialising outbound JSON messages.

pub mod codec;
pub mod reader;
pub mod router;
pub mod spawner;
pub mod writer;
