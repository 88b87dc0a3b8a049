use super::{PumpExit, PumpOutcome, is_peer_reset};
use crate::config::RelayConfig;
use crate::session::{ClaimId, SessionStore, Token};
use tokio::io::{AsyncRead, AsyncReadExt as _};

/// Move bytes from a sender's connection into the buffer created by
/// the sender's `claim`.
///
/// Reads at most `chunk_size` bytes at a time. Nothing is read while
/// the store is saturated. When the sender closes the connection, an
/// empty chunk is queued to tell the receiver the stream is over.
///
/// Read errors other than a peer reset are logged and the read is
/// retried, with no limit. The pump notices within one poll interval
/// that the session was torn down, even if the sender stays silent.
pub async fn reader_pump<R>(
    reader: &mut R,
    store: &dyn SessionStore,
    token: &Token,
    claim: ClaimId,
    config: &RelayConfig,
    peer: &str,
) -> PumpOutcome
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; config.chunk_size()];
    let mut bytes = 0;
    let exit = loop {
        if !store.owns_buffer(token, claim) {
            break PumpExit::SessionGone;
        }
        if store.buffer_is_saturated() {
            log::debug!("@{peer} Buffer saturated; waiting");
            tokio::time::sleep(config.saturation_backoff()).await;
            continue;
        }

        let Ok(read) = tokio::time::timeout(config.poll_interval(), reader.read(&mut buf)).await
        else {
            continue;
        };
        match read {
            Ok(n) => {
                if !store.push_chunk(token, claim, buf[..n].to_vec()) {
                    break PumpExit::SessionGone;
                }
                if n == 0 {
                    break PumpExit::EndOfStream;
                }
                bytes += n as u64;
            }
            Err(err) if is_peer_reset(&err) => {
                log::info!("@{peer} Connection reset by sender: {err}");
                break PumpExit::PeerReset;
            }
            Err(err) => {
                log::warn!("@{peer} Read failed: {err}");
                tokio::time::sleep(config.poll_interval()).await;
            }
        }
    };

    PumpOutcome { exit, bytes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{FileMetadata, InMemorySessionStore, Pop, Role};
    use rendezvous_network::config::{ByteValue, HumanDuration};
    use std::collections::VecDeque;
    use std::io;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::{AsyncWriteExt as _, ReadBuf};

    fn test_config() -> RelayConfig {
        RelayConfig {
            chunk_size: ByteValue(1024),
            poll_interval: HumanDuration::from_millis(10),
            saturation_backoff: HumanDuration::from_millis(10),
            ..Default::default()
        }
    }

    fn sender_store(capacity: usize) -> (Arc<InMemorySessionStore>, Token, ClaimId) {
        let store = Arc::new(InMemorySessionStore::new(capacity));
        let token = Token::from("abc");
        let claim = store
            .claim_role(&token, Role::Sender, FileMetadata::default())
            .unwrap();

        (store, token, claim)
    }

    fn drain(store: &InMemorySessionStore, token: &Token) -> Vec<Vec<u8>> {
        let mut chunks = vec![];
        while let Pop::Chunk(chunk) = store.pop_chunk(token) {
            chunks.push(chunk);
        }
        chunks
    }

    /// Replays a fixed sequence of read results, then reports EOF.
    struct ScriptedReader {
        steps: VecDeque<io::Result<Vec<u8>>>,
    }

    impl ScriptedReader {
        fn new(steps: Vec<io::Result<Vec<u8>>>) -> Self {
            Self {
                steps: steps.into(),
            }
        }
    }

    impl AsyncRead for ScriptedReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            match self.steps.pop_front() {
                Some(Ok(data)) => {
                    buf.put_slice(&data);
                    Poll::Ready(Ok(()))
                }
                Some(Err(err)) => Poll::Ready(Err(err)),
                None => Poll::Ready(Ok(())),
            }
        }
    }

    #[tokio::test]
    async fn queues_chunks_then_end_marker() {
        let (store, token, claim) = sender_store(10);
        let mut reader = ScriptedReader::new(vec![
            Ok(b"c1".to_vec()),
            Ok(b"c2".to_vec()),
            Ok(b"c3".to_vec()),
        ]);

        let outcome =
            reader_pump(&mut reader, &*store, &token, claim, &test_config(), "test").await;

        assert_eq!(
            outcome,
            PumpOutcome {
                exit: PumpExit::EndOfStream,
                bytes: 6
            }
        );
        assert_eq!(
            drain(&store, &token),
            vec![b"c1".to_vec(), b"c2".to_vec(), b"c3".to_vec(), vec![]]
        );
    }

    #[tokio::test]
    async fn splits_reads_at_chunk_size() {
        let (store, token, claim) = sender_store(10);
        let config = RelayConfig {
            chunk_size: ByteValue(4),
            ..test_config()
        };
        let mut reader = &b"0123456789"[..];

        let outcome = reader_pump(&mut reader, &*store, &token, claim, &config, "test").await;

        assert_eq!(outcome.exit, PumpExit::EndOfStream);
        assert_eq!(outcome.bytes, 10);
        assert_eq!(
            drain(&store, &token),
            vec![b"0123".to_vec(), b"4567".to_vec(), b"89".to_vec(), vec![]]
        );
    }

    #[tokio::test]
    async fn stops_without_buffer() {
        let store = InMemorySessionStore::new(10);
        let token = Token::from("abc");
        let claim = store.claim_role(&token, Role::Receiver, FileMetadata::default()).unwrap();
        let mut reader = ScriptedReader::new(vec![Ok(b"data".to_vec())]);

        let outcome = reader_pump(&mut reader, &store, &token, claim, &test_config(), "test").await;

        assert_eq!(outcome.exit, PumpExit::SessionGone);
        assert_eq!(store.queued_chunks(), 0);
    }

    #[tokio::test]
    async fn stops_on_peer_reset() {
        let (store, token, claim) = sender_store(10);
        let mut reader = ScriptedReader::new(vec![
            Ok(b"data".to_vec()),
            Err(io::Error::from(io::ErrorKind::ConnectionReset)),
            Ok(b"never read".to_vec()),
        ]);

        let outcome =
            reader_pump(&mut reader, &*store, &token, claim, &test_config(), "test").await;

        assert_eq!(
            outcome,
            PumpOutcome {
                exit: PumpExit::PeerReset,
                bytes: 4
            }
        );
        assert_eq!(drain(&store, &token), vec![b"data".to_vec()]);
    }

    #[tokio::test]
    async fn keeps_reading_after_transient_errors() {
        let (store, token, claim) = sender_store(10);
        let mut reader = ScriptedReader::new(vec![
            Ok(b"before".to_vec()),
            Err(io::Error::other("hiccup")),
            Err(io::Error::other("hiccup")),
            Err(io::Error::other("hiccup")),
            Err(io::Error::other("hiccup")),
            Ok(b"after".to_vec()),
        ]);

        let outcome =
            reader_pump(&mut reader, &*store, &token, claim, &test_config(), "test").await;

        assert_eq!(outcome.exit, PumpExit::EndOfStream);
        assert_eq!(
            drain(&store, &token),
            vec![b"before".to_vec(), b"after".to_vec(), vec![]]
        );
    }

    #[tokio::test]
    async fn notices_teardown_while_sender_is_silent() -> anyhow::Result<()> {
        let (store, token, claim) = sender_store(10);
        let (mut server, _client) = tokio::io::duplex(64);

        let pump = tokio::spawn({
            let store = Arc::clone(&store);
            let token = token.clone();
            async move {
                reader_pump(&mut server, &*store, &token, claim, &test_config(), "test").await
            }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!pump.is_finished());

        store.teardown(&token);
        let outcome = tokio::time::timeout(Duration::from_secs(5), pump).await??;
        assert_eq!(outcome.exit, PumpExit::SessionGone);

        Ok(())
    }

    #[tokio::test]
    async fn stale_claim_stops_after_token_is_reused() -> anyhow::Result<()> {
        let (store, token, old) = sender_store(10);
        store.claim_role(&token, Role::Receiver, FileMetadata::default())?;
        store.teardown(&token);
        let new = store.claim_role(&token, Role::Sender, FileMetadata::default())?;

        let (mut server, mut client) = tokio::io::duplex(64);
        client.write_all(b"stale").await?;
        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            reader_pump(&mut server, &*store, &token, old, &test_config(), "test"),
        )
        .await?;

        assert_eq!(outcome.exit, PumpExit::SessionGone);
        assert_eq!(outcome.bytes, 0);
        assert!(store.owns_buffer(&token, new));
        assert_eq!(store.pop_chunk(&token), Pop::Empty);

        Ok(())
    }

    #[tokio::test]
    async fn waits_while_saturated() -> anyhow::Result<()> {
        let (store, token, claim) = sender_store(1);
        let other = Token::from("other");
        let hog = store.claim_role(&other, Role::Sender, FileMetadata::default())?;
        store.push_chunk(&other, hog, b"hog".to_vec());
        assert!(store.buffer_is_saturated());

        let (mut server, mut client) = tokio::io::duplex(64);
        client.write_all(b"payload").await?;
        let pump = tokio::spawn({
            let store = Arc::clone(&store);
            let token = token.clone();
            async move {
                reader_pump(&mut server, &*store, &token, claim, &test_config(), "test").await
            }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.pop_chunk(&token), Pop::Empty);

        // Free the slot; the pending bytes get queued.
        assert_eq!(store.pop_chunk(&other), Pop::Chunk(b"hog".to_vec()));
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            match store.pop_chunk(&token) {
                Pop::Chunk(chunk) => {
                    assert_eq!(chunk, b"payload");
                    break;
                }
                _ => {
                    assert!(tokio::time::Instant::now() < deadline, "chunk never queued");
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }

        store.teardown(&token);
        drop(client);
        tokio::time::timeout(Duration::from_secs(5), pump).await??;

        Ok(())
    }
}
