use crate::negotiator::Relay;
use rendezvous_network::HostPort;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;

/// A server that listens on a port and hands every connection to a
/// [Relay].
pub struct Server {
    relay: Relay,
    tls: Option<TlsAcceptor>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Create a new server. Connections are wrapped in TLS if an
    /// acceptor is given.
    pub fn new(relay: Relay, tls: Option<TlsAcceptor>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            relay,
            tls,
            shutdown_tx,
        }
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    /// Stop listening, abort all connections and wait for the
    /// listener to be gone.
    ///
    /// Sessions left behind by aborted connections are removed.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        // Fails if nothing is listening, which is fine.
        let _ = self.shutdown_tx.send(());
        self.shutdown_tx.closed().await;
        self.relay.store().clear();

        Ok(())
    }

    /// Listen on the given address.
    ///
    /// The server spawns a task for listening in the background. The
    /// task runs as long as there is at least one server instance
    /// available through the Arc, or until [Server::shutdown] is
    /// called.
    pub async fn listen(self: &Arc<Self>, hostport: &HostPort) -> anyhow::Result<SocketAddr> {
        let listener = TcpListener::bind(hostport.addr()).await?;
        let addr = listener.local_addr()?;
        log::info!(
            "Listening on {addr}{}",
            if self.tls.is_some() { " (TLS)" } else { "" }
        );

        let mut shutdown_listener_rx = self.shutdown_tx.subscribe();
        let weak_self = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut connections = JoinSet::new();
            loop {
                tokio::select!(
                    _ = shutdown_listener_rx.recv() => {
                        log::debug!("Shutting down listener");
                        break;
                    }
                    Some(joined) = connections.join_next(), if !connections.is_empty() => {
                        if let Err(err) = joined {
                            if err.is_panic() {
                                log::warn!("Connection task panicked: {err}");
                            }
                        }
                    }
                    accepted = listener.accept() => {
                        let (stream, peer) = match accepted {
                            Ok(accepted) => accepted,
                            Err(err) => {
                                log::warn!("Failed to accept connection: {err}");
                                continue;
                            }
                        };
                        match weak_self.upgrade() {
                            Some(strong_self) => strong_self.accept(&mut connections, stream, peer),
                            None => {
                                // Server has been dropped; Shutdown listener.
                                break;
                            }
                        }
                    }
                );
            }
            connections.shutdown().await;
            log::debug!("Listener on {addr} closed");
        });

        Ok(addr)
    }

    fn accept(&self, connections: &mut JoinSet<()>, stream: TcpStream, peer: SocketAddr) {
        log::debug!("@{peer} Accepted connection");
        if let Err(err) = stream.set_nodelay(true) {
            log::debug!("@{peer} Failed to set TCP_NODELAY: {err}");
        }

        let relay = self.relay.clone();
        let tls = self.tls.clone();
        let peer = peer.to_string();
        connections.spawn(async move {
            match tls {
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(tls_stream) => relay.handle(tls_stream, &peer).await,
                    Err(err) => log::info!("@{peer} TLS handshake failed: {err}"),
                },
                None => relay.handle(stream, &peer).await,
            }
        });
    }
}
