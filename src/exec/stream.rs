// src/exec/stream.rs

//! Per-channel output draining.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing::debug;

use crate::types::{OutputChannel, OutputLine};

/// Drain one output pipe line-by-line into the shared line channel.
///
/// Each pipe gets its own drain task so a slow or failing reader on one
/// channel never starves the other. A read error is itself reported as a
/// synthetic line on the same channel before the drain stops; it must not
/// take down anything else.
pub(crate) fn spawn_drain<R>(
    channel: OutputChannel,
    reader: R,
    tx: mpsc::Sender<OutputLine>,
) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let reader = BufReader::new(reader);
        let mut lines = reader.lines();

        loop {
            match lines.next_line().await {
                Ok(Some(text)) => {
                    if tx.send(OutputLine { channel, text }).await.is_err() {
                        debug!(channel = channel.prefix(), "line receiver dropped; stopping drain");
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let synthetic = OutputLine {
                        channel,
                        text: format!("<appdock: read error on {}: {}>", channel.prefix(), e),
                    };
                    let _ = tx.send(synthetic).await;
                    break;
                }
            }
        }

        debug!(channel = channel.prefix(), "output drain finished");
    })
}
