use crate::config::RelayConfig;
use crate::handshake::{
    self, HandshakeError, Hello, START, refuse_connection, sender_announcement, waiting_line,
    write_line,
};
use crate::pump::{reader_pump, writer_pump};
use crate::session::{ClaimId, FileMetadata, InMemorySessionStore, Role, SessionStore, Token};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt as _, BufReader};
use tokio::time::Instant;

/// Refusal sent to a client whose peer didn't show up in time.
pub const PAIRING_TIMEOUT_MESSAGE: &str = "Timed out waiting for peer";

/// Drives connections from their hello line to a running pump.
///
/// Cheap to clone; clones share the same store.
#[derive(Clone)]
pub struct Relay {
    store: Arc<dyn SessionStore>,
    config: Arc<RelayConfig>,
}

impl Relay {
    pub fn new(store: Arc<dyn SessionStore>, config: RelayConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }

    /// Create a relay that keeps its sessions in memory.
    pub fn in_memory(config: RelayConfig) -> Self {
        let store = Arc::new(InMemorySessionStore::new(config.buffer_length_limit));
        Self::new(store, config)
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Serve one client connection until it is done.
    ///
    /// `peer` identifies the connection in logs.
    pub async fn handle<S>(&self, stream: S, peer: &str)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        // Payload sent right behind the hello line stays in the
        // buffer and is read by the pump.
        let mut stream = BufReader::new(stream);
        let hello = match handshake::read_hello(&mut stream).await {
            Ok(hello) => hello,
            Err(HandshakeError::Io(err)) => {
                log::debug!("@{peer} Failed to read hello: {err}");
                return;
            }
            Err(err) => {
                log::info!("@{peer} Invalid hello: {err}");
                refuse_connection(&mut stream, None).await;
                return;
            }
        };

        match hello.role {
            Role::Sender => self.serve_sender(stream, hello, peer).await,
            Role::Receiver => self.serve_receiver(stream, hello.token, peer).await,
        }
    }

    async fn serve_sender<S>(&self, mut stream: BufReader<S>, hello: Hello, peer: &str)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let token = hello.token;
        let metadata = hello.metadata;
        log::info!(
            "@{peer} Sender for {token}: {} ({} bytes)",
            metadata.file_name,
            metadata.file_size
        );
        let Some(claim) = self.claim(&mut stream, &token, Role::Sender, metadata, peer).await
        else {
            return;
        };
        if !self.wait_for_peer(&mut stream, &token, Role::Sender, peer).await {
            return;
        }
        if let Err(err) = write_line(&mut stream, START).await {
            log::info!("@{peer} Sender left before start: {err}");
            self.leave_paired(&token, Role::Sender);
            return;
        }

        let outcome =
            reader_pump(&mut stream, &*self.store, &token, claim, &self.config, peer).await;
        log::info!(
            "@{peer} Sender for {token} done ({:?}): {} bytes read",
            outcome.exit,
            outcome.bytes
        );
    }

    async fn serve_receiver<S>(&self, mut stream: BufReader<S>, token: Token, peer: &str)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        log::info!("@{peer} Receiver for {token}");
        if self
            .claim(&mut stream, &token, Role::Receiver, FileMetadata::default(), peer)
            .await
            .is_none()
        {
            return;
        }
        if !self.wait_for_peer(&mut stream, &token, Role::Receiver, peer).await {
            return;
        }

        let metadata = self
            .store
            .session(&token)
            .map(|s| s.metadata)
            .unwrap_or_default();
        let started = match write_line(&mut stream, &sender_announcement(&metadata)).await {
            Ok(()) => write_line(&mut stream, START).await,
            Err(err) => Err(err),
        };
        match started {
            Ok(()) => {
                let outcome =
                    writer_pump(&mut stream, &*self.store, &token, &self.config, peer).await;
                log::info!(
                    "@{peer} Receiver for {token} done ({:?}): {} bytes written",
                    outcome.exit,
                    outcome.bytes
                );
            }
            Err(err) => log::info!("@{peer} Receiver left before start: {err}"),
        }

        self.store.teardown(&token);
        log::debug!("@{peer} Session {token} torn down");
    }

    /// Claim `role`, or refuse the connection.
    async fn claim<W>(
        &self,
        stream: &mut W,
        token: &Token,
        role: Role,
        metadata: FileMetadata,
        peer: &str,
    ) -> Option<ClaimId>
    where
        W: AsyncWrite + Unpin,
    {
        self.store.ensure_session(token);
        match self.store.claim_role(token, role, metadata) {
            Ok(claim) => Some(claim),
            Err(err) => {
                log::info!("@{peer} Refused {role} for {token}: {err}");
                refuse_connection(stream, Some(&err.to_string())).await;
                None
            }
        }
    }

    /// Wait until both roles of the session are present.
    ///
    /// Tells the client it is waiting, at growing intervals: right
    /// away, then after 2, 3, 4... polls. Returns false, with the
    /// connection closed, if the client can't be told or the pairing
    /// timeout expires.
    ///
    /// A peer may claim its role at any point, even while this client
    /// is being let go. Giving up goes through
    /// [SessionStore::abandon_role], so either the role is released
    /// before the peer shows up or the session counts as paired.
    async fn wait_for_peer<W>(&self, stream: &mut W, token: &Token, role: Role, peer: &str) -> bool
    where
        W: AsyncWrite + Unpin,
    {
        let deadline = self.config.pairing_timeout().map(|t| Instant::now() + t);
        let mut index = 0;
        let mut step = 1;
        while !self.store.is_paired(token) {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                if self.store.abandon_role(token, role) {
                    log::info!("@{peer} No {} for {token}; giving up", role.peer());
                    refuse_connection(stream, Some(PAIRING_TIMEOUT_MESSAGE)).await;
                    return false;
                }
                log::debug!("@{peer} {} for {token} arrived at the deadline", role.peer());
                continue;
            }
            index += 1;
            if index >= step {
                if let Err(err) = write_line(stream, &waiting_line(role.peer())).await {
                    log::info!("@{peer} {role} for {token} left while waiting: {err}");
                    if !self.store.abandon_role(token, role) {
                        self.leave_paired(token, role);
                    }
                    let _ = stream.shutdown().await;
                    return false;
                }
                step += 1;
                index = 0;
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
        log::debug!("@{peer} {token} paired");

        true
    }

    /// Drop a client from a paired session before its pump started.
    /// The peer's pump then finds the buffer gone.
    fn leave_paired(&self, token: &Token, role: Role) {
        match role {
            Role::Sender => self.store.release_role(token, Role::Sender),
            Role::Receiver => {
                self.store.teardown(token);
            }
        }
    }
}
