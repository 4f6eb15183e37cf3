//! Shared test helpers for router-level integration tests.
//!
//! Provides a [`StubAgent`] — the agent end of an in-memory stdio pair —
//! and harness construction wiring a [`Router`] over `tokio::io::duplex`
//! pipes, so individual test modules can script wire-protocol exchanges
//! without spawning a process.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
use tokio_util::sync::CancellationToken;

use kiro_bridge::acp::router::Router;
use kiro_bridge::permission::PermissionPolicy;

/// Frame receive deadline: a scripted exchange should never be this slow.
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// The agent end of the wire: reads frames the client wrote, writes
/// frames the client will read.
pub struct StubAgent {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
}

impl StubAgent {
    /// Receive the next frame the client wrote.
    pub async fn recv(&mut self) -> Value {
        let mut line = String::new();
        let n = tokio::time::timeout(RECV_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a client frame")
            .expect("read from client failed");
        assert!(n > 0, "client closed the stream while a frame was expected");
        serde_json::from_str(line.trim()).expect("client frame must be valid JSON")
    }

    /// Receive the next frame, asserting its method.
    pub async fn recv_method(&mut self, method: &str) -> Value {
        let frame = self.recv().await;
        assert_eq!(
            frame["method"], method,
            "unexpected method in client frame: {frame}"
        );
        assert_eq!(frame["jsonrpc"], "2.0");
        frame
    }

    /// Assert that the client writes nothing within `window`.
    pub async fn expect_silence(&mut self, window: Duration) {
        let mut line = String::new();
        let read = tokio::time::timeout(window, self.reader.read_line(&mut line)).await;
        assert!(read.is_err(), "expected no client frame, got: {line}");
    }

    /// Write one frame to the client.
    pub async fn send(&mut self, value: &Value) {
        let mut bytes = serde_json::to_vec(value).expect("serialise stub frame");
        bytes.push(b'\n');
        self.send_raw(&bytes).await;
    }

    /// Write raw bytes to the client (partial-frame tests).
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer
            .write_all(bytes)
            .await
            .expect("write to client failed");
        self.writer.flush().await.expect("flush to client failed");
    }

    /// Answer `request` with a result.
    pub async fn respond_ok(&mut self, request: &Value, result: Value) {
        self.send(&json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "result": result,
        }))
        .await;
    }

    /// Answer `request` with a JSON-RPC error.
    pub async fn respond_err(&mut self, request: &Value, code: i64, message: &str) {
        self.send(&json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "error": { "code": code, "message": message },
        }))
        .await;
    }

    /// Emit a notification.
    pub async fn notify(&mut self, method: &str, params: Value) {
        self.send(&json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        }))
        .await;
    }
}

/// A router wired to a [`StubAgent`] over in-memory pipes.
pub struct Harness {
    pub router: Router,
    pub agent: StubAgent,
    pub edits: Arc<AtomicBool>,
    pub cancel: CancellationToken,
}

/// Connect a harness with the default 5-second request deadline.
pub fn connect_stub() -> Harness {
    connect_stub_with_timeout(Duration::from_secs(5))
}

/// Connect a harness with an explicit request deadline.
pub fn connect_stub_with_timeout(request_timeout: Duration) -> Harness {
    let (client_io, agent_io) = tokio::io::duplex(1024 * 1024);
    let (client_read, client_write) = tokio::io::split(client_io);
    let (agent_read, agent_write) = tokio::io::split(agent_io);

    let edits = Arc::new(AtomicBool::new(true));
    let policy = PermissionPolicy::new(Arc::clone(&edits));
    let cancel = CancellationToken::new();

    let router = Router::connect(
        client_read,
        client_write,
        policy,
        request_timeout,
        &cancel,
        None,
    );

    Harness {
        router,
        agent: StubAgent {
            reader: BufReader::new(agent_read),
            writer: agent_write,
        },
        edits,
        cancel,
    }
}
