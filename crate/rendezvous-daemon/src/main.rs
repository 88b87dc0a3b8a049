//! Daemon binary for the rendezvous relay

use anyhow::Context as _;
use clap::Parser;
use futures_util::stream::StreamExt as _;
use rendezvous_core::{Relay, Server};
use rendezvous_network::{HostPort, security};
use signal_hook_tokio::Signals;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

mod config;
mod logging;

/// Run the rendezvous relay in the foreground.
///
/// A sender and a receiver that connect with the same token are paired
/// and the sender's bytes are streamed to the receiver. Stop it with
/// SIGTERM.
///
/// By default, outputs errors and warnings to stderr, as well as
/// connection events. To configure the output, set the env variable
/// RUST_LOG. Set the env variable RUST_LOG_FORMAT=SYSTEMD to a
/// systemd-friendly log output.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about, verbatim_doc_comment)]
struct Cli {
    /// TCP address to listen on (default: localhost:9900)
    #[arg(long, env = "RENDEZVOUS_ADDRESS")]
    address: Option<String>,

    /// Path to the TOML configuration file
    #[arg(long, env = "RENDEZVOUS_CONFIG")]
    config: Option<PathBuf>,

    /// Path to the PEM-encoded certificate chain; enables TLS
    #[arg(long, env = "RENDEZVOUS_CERT")]
    cert: Option<PathBuf>,

    /// Path to the PEM-encoded private key of the certificate
    #[arg(long, env = "RENDEZVOUS_KEY")]
    key: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(&["rendezvousd", "rendezvous_core"]);

    if let Err(err) = execute(cli).await {
        eprintln!("ERROR: {err:#}");
        process::exit(1);
    };
}

async fn execute(cli: Cli) -> anyhow::Result<()> {
    let settings =
        config::Settings::resolve(cli.address, cli.cert, cli.key, cli.config.as_deref())?;

    let tls = match &settings.tls {
        Some(tls) => Some(
            security::make_tls_acceptor(&tls.cert, &tls.key)
                .context("Failed to set up TLS")?,
        ),
        None => None,
    };

    let hostport = HostPort::parse(&settings.address)
        .await
        .with_context(|| format!("Failed to parse address {}", settings.address))?;
    log::debug!("Starting server on {}/{:?}...", hostport, hostport.addr());
    let server = Arc::new(Server::new(Relay::in_memory(settings.relay), tls));
    let addr = server
        .listen(&hostport)
        .await
        .with_context(|| format!("Failed to start server on {hostport}"))?;

    let mut signals = Signals::new([
        signal_hook::consts::SIGHUP,
        signal_hook::consts::SIGTERM,
        signal_hook::consts::SIGINT,
        signal_hook::consts::SIGQUIT,
    ])?;

    println!("Listening on {addr}");

    let _ = signals.next().await;

    log::info!("Interrupted. Shutting down..");
    signals.handle().close(); // A 2nd signal kills the process
    server.shutdown().await?;

    Ok(())
}
