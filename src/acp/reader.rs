//! ACP reader task.
//!
//! Drives a [`FramedRead`] over the agent's stdout using [`AcpCodec`],
//! parses each completed line into a [`Frame`], and hands it to
//! [`Router::dispatch_frame`]. Malformed lines are discarded silently
//! (log only) — they never terminate the reader.
//!
//! EOF and I/O errors are terminal: the reader runs connection-lost
//! cleanup on the router (failing every pending request, dropping all
//! subscribers) and then invokes the optional `on_closed` hook so the
//! owning client can reset session state. Cancellation is *not* terminal
//! in that sense — the disposal path performs its own cleanup, so the
//! reader just stops.

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::acp::codec::{AcpCodec, Frame};
use crate::acp::router::Router;
use crate::Result;

/// Read frames from `stdout` until EOF, I/O error, or cancellation.
///
/// # Errors
///
/// Always returns `Ok(())`; stream failures are reported through the
/// router's cleanup path rather than the task result.
pub async fn run_reader<R>(
    router: Router,
    stdout: R,
    cancel: CancellationToken,
    on_closed: Option<Box<dyn FnOnce(&str) + Send>>,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stdout, AcpCodec::new());
    let mut closed_reason: Option<String> = None;

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("acp reader: cancellation received, stopping");
                break;
            }

            item = framed.next() => {
                match item {
                    None => {
                        debug!("acp reader: EOF detected");
                        closed_reason = Some("stream closed".to_owned());
                        break;
                    }

                    Some(Err(e)) => {
                        warn!(error = %e, "acp reader: stream error, stopping");
                        closed_reason = Some(format!("stream error: {e}"));
                        break;
                    }

                    Some(Ok(line)) => match Frame::parse(&line) {
                        Some(frame) => router.dispatch_frame(frame).await,
                        None => {
                            debug!(raw_line = %line, "acp reader: discarding malformed frame");
                        }
                    },
                }
            }
        }
    }

    if let Some(reason) = closed_reason {
        router.connection_lost(&reason);
        if let Some(hook) = on_closed {
            hook(&reason);
        }
    }

    Ok(())
}
