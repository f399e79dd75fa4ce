//! Relay node binary.
//!
//! Connects to a relay server, opens a connection to one remote peer, sends
//! every line read from stdin to that peer and prints whatever it sends back.
//! The connection is reopened after the relay link recovers.

use anyhow::{bail, Context};
use clap::Parser;
use relay_client::{Client, ClientError, RelayConn};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod logging;

use config::RelayNodeConfig;
use logging::RelayLogFormatter;

/// Pause before retrying to open the peer connection while reconnecting
const REOPEN_INTERVAL: Duration = Duration::from_secs(1);

/// Relay client node
#[derive(Parser, Debug)]
#[command(name = "relay", version, about = "Exchange data with a peer through a relay server")]
struct Args {
    /// Relay server address, e.g. relay.example.com:3478
    #[arg(long)]
    server: Option<String>,

    /// Logical ID of this peer
    #[arg(long)]
    peer_id: Option<String>,

    /// Logical ID of the peer to exchange data with
    #[arg(long)]
    remote_peer: Option<String>,

    /// Handshake timeout, e.g. 8s
    #[arg(long)]
    handshake_timeout: Option<humantime::Duration>,

    /// Delay between reconnection attempts, e.g. 5s
    #[arg(long)]
    reconnect_interval: Option<humantime::Duration>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Configuration file path
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

impl Args {
    fn apply_to(self, config: &mut RelayNodeConfig) {
        if let Some(server) = self.server {
            config.server_address = server;
        }
        if let Some(peer_id) = self.peer_id {
            config.peer_id = peer_id;
        }
        if self.remote_peer.is_some() {
            config.remote_peer = self.remote_peer;
        }
        if let Some(timeout) = self.handshake_timeout {
            config.handshake_timeout = timeout.into();
        }
        if let Some(interval) = self.reconnect_interval {
            config.reconnect_interval = interval.into();
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::new("info")
        .add_directive(format!("relay={}", args.log_level).parse()?)
        .add_directive(format!("relay_client={}", args.log_level).parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .event_format(RelayLogFormatter::new("relay".to_string()))
        .init();

    info!(component = "node", "Starting relay node v{}", env!("CARGO_PKG_VERSION"));

    let mut node_config = RelayNodeConfig::load_from_file(&args.config)?;
    args.apply_to(&mut node_config);

    if node_config.peer_id.is_empty() {
        bail!("no peer id configured, pass --peer-id or set RELAY_PEER_ID");
    }
    let remote_peer = node_config
        .remote_peer
        .clone()
        .context("no remote peer configured, pass --remote-peer")?;

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!(component = "node", "Received Ctrl-C, shutting down");
            ctrl_c.cancel();
        }
    });

    let client = Client::new(node_config.client_config(), &shutdown);
    client.connect().await.with_context(|| {
        format!("failed to connect to relay server {}", node_config.server_address)
    })?;
    info!(
        component = "node",
        "Connected as {} via {}",
        client.local_id(),
        client.server_address()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while !shutdown.is_cancelled() {
        let conn = match client.open_connection(&remote_peer).await {
            Ok(conn) => conn,
            Err(ClientError::NotConnected) if client.state().is_running() => {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(REOPEN_INTERVAL) => continue,
                }
            }
            Err(ClientError::NotConnected) => break,
            Err(e) => return Err(e).context("failed to open peer connection"),
        };

        info!(component = "node", "Talking to {} ({})", remote_peer, conn.remote_id());
        if !exchange(&conn, &mut lines, &shutdown).await? {
            break;
        }
    }

    shutdown.cancel();
    client.close().await.context("failed to close relay client")?;
    info!(component = "node", "Relay node stopped");
    Ok(())
}

/// Pump stdin to the peer and the peer to stdout until the connection ends.
///
/// Returns `false` once stdin is exhausted or shutdown was requested.
async fn exchange(
    conn: &RelayConn,
    lines: &mut Lines<BufReader<Stdin>>,
    shutdown: &CancellationToken,
) -> anyhow::Result<bool> {
    let mut buf = vec![0u8; relay_client::DEFAULT_READ_BUFFER_SIZE];

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(false),
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    return Ok(false);
                };
                if let Err(e) = conn.write(line.as_bytes()).await {
                    warn!(component = "node", "Failed to send to {}: {}", conn.remote_id(), e);
                }
            }
            read = conn.read(&mut buf) => match read {
                Ok(0) => {
                    warn!(component = "node", "Connection to {} ended", conn.remote_id());
                    return Ok(true);
                }
                Ok(n) => println!("{}", String::from_utf8_lossy(&buf[..n])),
                Err(e) => {
                    warn!(component = "node", "Failed to read from {}: {}", conn.remote_id(), e);
                    return Ok(true);
                }
            },
        }
    }
}
