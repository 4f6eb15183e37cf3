//! NDJSON codec and frame parsing for the agent's stdio streams.
//!
//! Framing is strictly newline-terminated UTF-8 JSON objects: each decoded
//! line is one complete JSON-RPC frame, and each outbound frame is one
//! serialised object plus a trailing `\n`. The codec imposes no line-length
//! limit; prompts routinely embed whole documents in a single frame.
//!
//! [`Frame`] extracts the structural fields a frame is classified by. The
//! classification itself (response / incoming request / notification) lives
//! in the router, because "response" means *an identifier matching a live
//! pending-request entry*, which only the router knows.

use bytes::BytesMut;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// NDJSON codec for bidirectional agent streams.
///
/// Delegates line framing to [`LinesCodec`]. Reading buffers incoming
/// bytes and yields one complete line at a time, holding back the final
/// incomplete fragment; writing appends one `\n`-terminated line per item.
#[derive(Debug)]
pub struct AcpCodec(LinesCodec);

impl AcpCodec {
    /// Create a new `AcpCodec`.
    #[must_use]
    pub fn new() -> Self {
        Self(LinesCodec::new())
    }
}

impl Default for AcpCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for AcpCodec {
    type Item = String;
    type Error = AppError;

    /// Decode the next newline-terminated line from `src`.
    ///
    /// Returns `Ok(None)` when `src` contains no complete line yet.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode(src).map_err(map_codec_error)
    }

    /// Decode the final line when the stream reaches EOF.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode_eof(src).map_err(map_codec_error)
    }
}

impl Encoder<String> for AcpCodec {
    type Error = AppError;

    /// Encode `item` as a `\n`-terminated NDJSON line into `dst`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] on underlying I/O failures.
    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        self.0.encode(item, dst).map_err(map_codec_error)
    }
}

// ── Frame parsing ────────────────────────────────────────────────────────────

/// Structural fields of one inbound JSON-RPC frame.
///
/// `id` is kept as a raw [`Value`] — our own request identifiers are
/// integers, but an incoming request's identifier is opaque and must be
/// echoed verbatim in the reply.
#[derive(Debug, Clone, Deserialize)]
pub struct Frame {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl Frame {
    /// Parse a decoded line into a frame.
    ///
    /// Returns `None` for malformed JSON or non-object payloads; the
    /// caller discards those lines silently (log only).
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Object(_)) => serde_json::from_str(trimmed).ok(),
            _ => None,
        }
    }

    /// The frame's identifier as an integer, when it has one.
    ///
    /// Identifiers allocated by this client are always integers; anything
    /// else cannot match a pending entry.
    #[must_use]
    pub fn numeric_id(&self) -> Option<i64> {
        self.id.as_ref().and_then(Value::as_i64)
    }

    /// Extract the error message from a response's `error` object.
    ///
    /// Falls back to the stringified error object when it carries no
    /// `message` field, so the JSON-RPC code still reaches the caller.
    #[must_use]
    pub fn error_message(error: &Value) -> String {
        error
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| error.to_string(), str::to_owned)
    }
}

// ── Private helper ───────────────────────────────────────────────────────────

/// Map a [`LinesCodecError`] to an [`AppError`].
fn map_codec_error(e: LinesCodecError) -> AppError {
    match e {
        LinesCodecError::MaxLineLengthExceeded => {
            // Unreachable with an unbounded codec; kept for the exhaustive match.
            AppError::Codec("line too long".into())
        }
        LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
    }
}
