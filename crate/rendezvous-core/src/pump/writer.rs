use super::{PumpExit, PumpOutcome, is_peer_reset};
use crate::config::RelayConfig;
use crate::session::{Pop, SessionStore, Token};
use tokio::io::{AsyncWrite, AsyncWriteExt as _};

/// Move chunks from the session's buffer to a receiver's connection.
///
/// Stops at the empty end-of-stream chunk, or when nothing was queued
/// for `idle_polls` polls in a row. A chunk that can't be written is
/// dropped; after more than `write_error_limit` consecutive failures
/// the pump gives up. The connection is shut down on return.
pub async fn writer_pump<W>(
    writer: &mut W,
    store: &dyn SessionStore,
    token: &Token,
    config: &RelayConfig,
    peer: &str,
) -> PumpOutcome
where
    W: AsyncWrite + Unpin,
{
    let mut empty_pops = 0;
    let mut write_errors = 0;
    let mut bytes = 0;
    let exit = loop {
        let chunk = match store.pop_chunk(token) {
            Pop::Gone => break PumpExit::SessionGone,
            Pop::Empty => {
                empty_pops += 1;
                if empty_pops > config.idle_polls {
                    log::debug!("@{peer} Nothing to send for {empty_pops} polls");
                    break PumpExit::Idle;
                }
                tokio::time::sleep(config.poll_interval()).await;
                continue;
            }
            Pop::Chunk(chunk) => chunk,
        };
        empty_pops = 0;
        if chunk.is_empty() {
            break PumpExit::EndOfStream;
        }

        match write_chunk(writer, &chunk).await {
            Ok(()) => {
                write_errors = 0;
                bytes += chunk.len() as u64;
            }
            Err(err) if is_peer_reset(&err) => {
                log::info!("@{peer} Connection reset by receiver: {err}");
                break PumpExit::PeerReset;
            }
            Err(err) => {
                write_errors += 1;
                log::warn!(
                    "@{peer} Write failed ({write_errors}); {} bytes dropped: {err}",
                    chunk.len()
                );
                if write_errors > config.write_error_limit {
                    break PumpExit::TooManyErrors;
                }
                tokio::time::sleep(config.poll_interval()).await;
            }
        }
    };
    if let Err(err) = writer.shutdown().await {
        log::debug!("@{peer} Shutdown failed: {err}");
    }

    PumpOutcome { exit, bytes }
}

async fn write_chunk<W>(writer: &mut W, chunk: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(chunk).await?;
    writer.flush().await
}
