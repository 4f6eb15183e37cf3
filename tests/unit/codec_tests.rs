//! Unit tests for NDJSON framing and structural frame parsing.

use bytes::BytesMut;
use serde_json::json;
use tokio_util::codec::Decoder;

use kiro_bridge::acp::codec::{AcpCodec, Frame};

// ── Line framing ─────────────────────────────────────────────────────────────

/// A complete JSON object on a single newline-terminated line is decoded
/// without error and returned without the trailing newline.
#[test]
fn single_line_decodes() {
    let mut codec = AcpCodec::new();
    let mut buf = BytesMut::from("{\"jsonrpc\":\"2.0\",\"method\":\"session/update\"}\n");

    let result = codec.decode(&mut buf).expect("decode must succeed");

    assert_eq!(
        result,
        Some("{\"jsonrpc\":\"2.0\",\"method\":\"session/update\"}".to_owned()),
        "codec must return the line content without the newline"
    );
}

/// Two frames delivered in one buffer decode as two separate items.
#[test]
fn batched_lines_decode_separately() {
    let mut codec = AcpCodec::new();
    let raw = concat!(
        "{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n",
        "{\"jsonrpc\":\"2.0\",\"method\":\"kiro.dev/metadata\",\"params\":{}}\n",
    );
    let mut buf = BytesMut::from(raw);

    assert!(codec.decode(&mut buf).expect("first decode").is_some());
    assert!(codec.decode(&mut buf).expect("second decode").is_some());
    assert!(
        codec.decode(&mut buf).expect("empty decode").is_none(),
        "no further lines must be present"
    );
}

/// A frame without its terminating newline is held back; the completed
/// line is yielded once the newline arrives.
#[test]
fn partial_line_is_buffered_until_newline() {
    let mut codec = AcpCodec::new();

    let mut buf = BytesMut::from("{\"jsonrpc\":\"2.0\",\"id\":7");
    assert!(
        codec.decode(&mut buf).expect("partial decode").is_none(),
        "incomplete fragment must not be emitted"
    );

    buf.extend_from_slice(b",\"result\":{}}\n");
    let line = codec
        .decode(&mut buf)
        .expect("decode after newline")
        .expect("completed line must be emitted");
    assert_eq!(line, "{\"jsonrpc\":\"2.0\",\"id\":7,\"result\":{}}");
}

/// A zero-byte read must not corrupt the buffer: decoding an empty buffer
/// yields nothing, and a subsequent full line still round-trips.
#[test]
fn zero_byte_read_does_not_corrupt_buffer() {
    let mut codec = AcpCodec::new();
    let mut buf = BytesMut::new();

    assert!(
        codec.decode(&mut buf).expect("empty decode").is_none(),
        "empty buffer must decode to None"
    );

    buf.extend_from_slice(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n");
    assert!(
        codec.decode(&mut buf).expect("decode").is_some(),
        "a full line after the empty read must still decode"
    );
}

/// A 1 MiB frame split across 100 reads round-trips intact — the codec
/// imposes no length limit.
#[test]
fn large_frame_split_across_reads_round_trips() {
    let payload = "x".repeat(1_048_576);
    let frame = format!("{{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{{\"text\":\"{payload}\"}}}}\n");
    let bytes = frame.as_bytes();

    let mut codec = AcpCodec::new();
    let mut buf = BytesMut::new();
    let chunk = bytes.len().div_ceil(100);

    let mut decoded = None;
    for piece in bytes.chunks(chunk) {
        buf.extend_from_slice(piece);
        if let Some(line) = codec.decode(&mut buf).expect("decode must not error") {
            decoded = Some(line);
        }
    }

    let line = decoded.expect("frame must decode once the final read arrives");
    assert_eq!(line.len(), frame.len() - 1, "only the newline is stripped");
    let parsed = Frame::parse(&line).expect("frame must parse");
    assert_eq!(parsed.numeric_id(), Some(1));
}

// ── Frame parsing ────────────────────────────────────────────────────────────

/// Malformed JSON parses to `None` so the reader can discard it.
#[test]
fn malformed_json_parses_to_none() {
    assert!(Frame::parse("not-json{{{").is_none());
}

/// Valid JSON that is not an object is not a frame.
#[test]
fn non_object_payload_parses_to_none() {
    assert!(Frame::parse("[1,2,3]").is_none());
    assert!(Frame::parse("42").is_none());
    assert!(Frame::parse("\"hello\"").is_none());
}

/// Empty and whitespace-only lines are not frames.
#[test]
fn blank_line_parses_to_none() {
    assert!(Frame::parse("").is_none());
    assert!(Frame::parse("   ").is_none());
}

/// Structural fields are extracted as present.
#[test]
fn frame_fields_are_extracted() {
    let frame = Frame::parse(
        r#"{"jsonrpc":"2.0","id":3,"method":"session/request_permission","params":{"options":[]}}"#,
    )
    .expect("frame must parse");

    assert_eq!(frame.numeric_id(), Some(3));
    assert_eq!(frame.method.as_deref(), Some("session/request_permission"));
    assert!(frame.params.is_some());
    assert!(frame.result.is_none());
    assert!(frame.error.is_none());
}

/// A non-integer identifier never matches the pending table.
#[test]
fn string_identifier_has_no_numeric_id() {
    let frame = Frame::parse(r#"{"id":"abc","method":"x"}"#).expect("frame must parse");
    assert_eq!(frame.numeric_id(), None);
    assert!(frame.id.is_some(), "the raw identifier is still available");
}

/// `error.message` is preferred; an error object without one is
/// stringified so the JSON-RPC code still reaches the caller.
#[test]
fn error_message_extraction() {
    let with_message = json!({ "code": -32601, "message": "Method not found" });
    assert_eq!(Frame::error_message(&with_message), "Method not found");

    let without_message = json!({ "code": -32601 });
    let text = Frame::error_message(&without_message);
    assert!(
        text.contains("-32601"),
        "stringified error must carry the code, got: {text}"
    );
}
