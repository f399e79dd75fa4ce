//! Relay client: HELLO handshake, reconnection and peer multiplexing.
//!
//! This crate connects to a relay server over a single physical connection
//! and multiplexes any number of virtual peer connections over it. Outgoing
//! payloads are tagged with the destination's hashed id, incoming Transport
//! messages are routed by the sender's hashed id to the matching
//! [`RelayConn`].
//!
//! ## Features
//!
//! - **Handshake**: HELLO / HelloResponse exchange with a bounded wait
//! - **Read Loop**: one reader per physical connection demultiplexing frames
//! - **Auto-reconnect**: fixed-interval retries for as long as the client runs
//! - **Virtual Connections**: per-peer byte streams with end-of-stream on loss
//!
//! ## Example
//!
//! ```rust,no_run
//! use relay_client::{Client, ClientConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let shutdown = CancellationToken::new();
//! let client = Client::new(ClientConfig::new("relay.example.com:3478", "alice"), &shutdown);
//! client.connect().await?;
//!
//! let conn = client.open_connection("bob").await?;
//! conn.write(b"hello bob").await?;
//!
//! let mut buf = [0u8; 1500];
//! let n = conn.read(&mut buf).await?;
//! println!("bob says: {}", String::from_utf8_lossy(&buf[..n]));
//!
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod conn;
pub mod error;
pub mod handshake;
mod registry;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types
pub use client::Client;
pub use config::{
    ClientConfig, DEFAULT_DELIVERY_CAPACITY, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_READ_BUFFER_SIZE,
    DEFAULT_RECONNECT_INTERVAL,
};
pub use conn::RelayConn;
pub use error::ClientError;
pub use handshake::{handshake, recv_hello_response, send_hello};
pub use registry::ClientState;
pub use transport::{Dialer, RelayTransport, UdpDialer, UdpTransport};
