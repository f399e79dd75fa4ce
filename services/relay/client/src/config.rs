//! Client configuration.

use std::time::Duration;

/// Fixed receive buffer, matching a typical link MTU
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1500;

/// How long the server has to answer a Hello
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(8);

/// Pause between reconnection attempts
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// Frames buffered per virtual connection before the read loop blocks
pub const DEFAULT_DELIVERY_CAPACITY: usize = 2;

/// Configuration for a relay client
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Relay server address, e.g. `relay.example.com:3478`
    pub server_address: String,
    /// Logical ID of the local peer (hashed before use)
    pub peer_id: String,
    /// Bound on the wait for a HelloResponse
    pub handshake_timeout: Duration,
    /// Fixed delay between reconnection attempts
    pub reconnect_interval: Duration,
    /// Size of the receive buffer used by the read loop
    pub read_buffer_size: usize,
    /// Capacity of each virtual connection's delivery queue
    pub delivery_capacity: usize,
}

impl ClientConfig {
    /// Configuration with default timings for the given server and peer
    pub fn new(server_address: impl Into<String>, peer_id: impl Into<String>) -> Self {
        Self {
            server_address: server_address.into(),
            peer_id: peer_id.into(),
            ..Self::default()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1:3478".to_string(),
            peer_id: String::new(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            delivery_capacity: DEFAULT_DELIVERY_CAPACITY,
        }
    }
}
