//! Configuration handling for the relay node.
//!
//! Values are read from the `relay:` section of the shared config file, then
//! overridden by environment variables, then by command line flags.

use anyhow::{Context, Result};
use relay_client::{ClientConfig, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_RECONNECT_INTERVAL};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Relay node configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RelayNodeConfig {
    /// Relay server address
    pub server_address: String,
    /// Logical ID of this peer
    pub peer_id: String,
    /// Logical ID of the peer to exchange data with
    pub remote_peer: Option<String>,
    /// Bound on the wait for a HelloResponse
    pub handshake_timeout: Duration,
    /// Delay between reconnection attempts
    pub reconnect_interval: Duration,
}

impl Default for RelayNodeConfig {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1:3478".to_string(),
            peer_id: String::new(),
            remote_peer: None,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
        }
    }
}

/// Root configuration structure (matches the YAML structure)
#[derive(Debug, Deserialize)]
struct RootConfig {
    relay: Option<RelaySection>,
}

#[derive(Debug, Deserialize)]
struct RelaySection {
    server_address: Option<String>,
    peer_id: Option<String>,
    remote_peer: Option<String>,
    handshake_timeout: Option<String>,
    reconnect_interval: Option<String>,
}

impl RelayNodeConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config = Self::default();

        match std::fs::read_to_string(&config_path) {
            Ok(content) => match serde_yaml::from_str::<RootConfig>(&content) {
                Ok(root_config) => {
                    if let Some(section) = root_config.relay {
                        config.apply_section(section).with_context(|| {
                            format!("invalid relay section in {:?}", config_path.as_ref())
                        })?;
                    }
                    info!("Loaded configuration from {:?}", config_path.as_ref());
                }
                Err(e) => warn!(
                    "Failed to parse config file {:?}, using defaults: {}",
                    config_path.as_ref(),
                    e
                ),
            },
            Err(_) => warn!(
                "Config file {:?} not found, using defaults",
                config_path.as_ref()
            ),
        }

        config.apply_overrides(|key| std::env::var(key).ok());

        info!(
            "Relay configuration: server={}, peer_id={}, handshake_timeout={:?}, reconnect_interval={:?}",
            config.server_address, config.peer_id, config.handshake_timeout, config.reconnect_interval
        );

        Ok(config)
    }

    fn apply_section(&mut self, section: RelaySection) -> Result<()> {
        if let Some(server_address) = section.server_address {
            self.server_address = server_address;
        }
        if let Some(peer_id) = section.peer_id {
            self.peer_id = peer_id;
        }
        if section.remote_peer.is_some() {
            self.remote_peer = section.remote_peer;
        }
        if let Some(timeout) = section.handshake_timeout {
            self.handshake_timeout = humantime::parse_duration(&timeout)
                .with_context(|| format!("handshake_timeout {:?}", timeout))?;
        }
        if let Some(interval) = section.reconnect_interval {
            self.reconnect_interval = humantime::parse_duration(&interval)
                .with_context(|| format!("reconnect_interval {:?}", interval))?;
        }
        Ok(())
    }

    /// Apply `RELAY_*` overrides looked up through `lookup`
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(server_address) = lookup("RELAY_SERVER_ADDRESS") {
            info!("Server address overridden by environment: {}", server_address);
            self.server_address = server_address;
        }

        if let Some(peer_id) = lookup("RELAY_PEER_ID") {
            info!("Peer ID overridden by environment: {}", peer_id);
            self.peer_id = peer_id;
        }

        if let Some(value) = lookup("RELAY_HANDSHAKE_TIMEOUT") {
            match humantime::parse_duration(&value) {
                Ok(timeout) => {
                    self.handshake_timeout = timeout;
                    info!("Handshake timeout overridden by environment: {:?}", timeout);
                }
                Err(e) => warn!("Ignoring RELAY_HANDSHAKE_TIMEOUT={:?}: {}", value, e),
            }
        }

        if let Some(value) = lookup("RELAY_RECONNECT_INTERVAL") {
            match humantime::parse_duration(&value) {
                Ok(interval) => {
                    self.reconnect_interval = interval;
                    info!("Reconnect interval overridden by environment: {:?}", interval);
                }
                Err(e) => warn!("Ignoring RELAY_RECONNECT_INTERVAL={:?}: {}", value, e),
            }
        }
    }

    /// Library configuration for this node
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            handshake_timeout: self.handshake_timeout,
            reconnect_interval: self.reconnect_interval,
            ..ClientConfig::new(self.server_address.clone(), self.peer_id.clone())
        }
    }
}
