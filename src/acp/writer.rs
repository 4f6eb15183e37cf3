//! ACP writer task.
//!
//! Receives outbound JSON frames from a tokio [`mpsc`] channel, serialises
//! each value to a single compact line, appends the `\n` delimiter, and
//! writes the bytes to the agent's stdin. One frame per channel message
//! keeps writes atomic at the framing level no matter how many callers
//! are issuing requests concurrently.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{AppError, Result};

/// Serialise outbound frames from `rx` into `stdin` until cancellation,
/// channel close, or a write failure.
///
/// # Errors
///
/// - [`AppError::Codec`] if serialisation fails (should not occur for
///   [`serde_json::Value`]).
/// - [`AppError::Io`] if the write to stdin fails (e.g. the agent process
///   has exited); the reader's EOF path owns the resulting cleanup.
pub async fn run_writer<W>(
    stdin: W,
    mut rx: mpsc::Receiver<serde_json::Value>,
    cancel: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut stdin = stdin;

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("acp writer: cancellation received, stopping");
                break;
            }

            msg = rx.recv() => {
                match msg {
                    None => {
                        debug!("acp writer: frame channel closed, stopping");
                        break;
                    }
                    Some(value) => {
                        let mut bytes = serde_json::to_vec(&value)
                            .map_err(|e| AppError::Codec(format!("serialise outbound frame: {e}")))?;
                        bytes.push(b'\n');

                        if let Err(e) = stdin.write_all(&bytes).await {
                            warn!(error = %e, "acp writer: write to stdin failed, stopping");
                            return Err(AppError::Io(e.to_string()));
                        }
                        if let Err(e) = stdin.flush().await {
                            warn!(error = %e, "acp writer: flush failed, stopping");
                            return Err(AppError::Io(e.to_string()));
                        }
                    }
                }
            }
        }
    }

    Ok(())
}
