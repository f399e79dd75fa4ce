//! Relay client: connection supervisor, read loop and reconnection guard.
//!
//! A [`Client`] owns one physical connection to the relay server at a time.
//! After a successful [`Client::connect`] three background tasks run:
//!
//! - the read loop, one per physical connection, which demultiplexes incoming
//!   Transport messages into the open [`RelayConn`]s
//! - the reconnection guard, which waits for the read loop to exit and dials
//!   again at a fixed interval until it succeeds or the client is closed
//! - a watcher that closes the client when the external cancellation token
//!   fires
//!
//! [`Client::close`] stops all of them and only returns once the read loop
//! and the reconnection guard have exited.

use crate::config::ClientConfig;
use crate::conn::RelayConn;
use crate::handshake::handshake;
use crate::registry::{ClientState, CloseAction, Msg, Registry};
use crate::transport::{Dialer, RelayTransport, UdpDialer};
use crate::ClientError;
use bytes::Bytes;
use relay_wire::{
    determine_server_msg_type, hash_id, hash_id_to_string, marshal_transport_msg,
    unmarshal_transport_id, MsgType, PeerId,
};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Client of a relay server
pub struct Client {
    inner: Arc<Inner>,
}

struct ReadLoopHandle {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Lifecycle {
    read_loop: Option<ReadLoopHandle>,
    guard: Option<JoinHandle<()>>,
}

pub(crate) struct Inner {
    config: ClientConfig,
    dialer: Arc<dyn Dialer>,
    local_id: PeerId,
    local_id_str: String,
    cancel: CancellationToken,
    registry: Registry,
    /// Serializes connect, reconnect, close and open
    lifecycle: Mutex<Lifecycle>,
    read_loop_exited: Notify,
}

impl Client {
    /// Create a client that dials the relay over UDP.
    ///
    /// Cancelling `cancel` closes the client once it is connected.
    pub fn new(config: ClientConfig, cancel: &CancellationToken) -> Self {
        Self::with_dialer(config, Arc::new(UdpDialer), cancel)
    }

    /// Create a client using a custom transport dialer
    pub fn with_dialer(
        config: ClientConfig,
        dialer: Arc<dyn Dialer>,
        cancel: &CancellationToken,
    ) -> Self {
        let (local_id, local_id_str) = hash_id(&config.peer_id);
        Self {
            inner: Arc::new(Inner {
                config,
                dialer,
                local_id,
                local_id_str,
                cancel: cancel.child_token(),
                registry: Registry::new(),
                lifecycle: Mutex::new(Lifecycle::default()),
                read_loop_exited: Notify::new(),
            }),
        }
    }

    /// Connect to the relay server.
    ///
    /// Returns immediately if the client is already running. On failure the
    /// client stays idle and `connect` may be called again.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let inner = &self.inner;
        let mut lifecycle = inner.lifecycle.lock().await;

        match inner.registry.state() {
            state if state.is_running() => return Ok(()),
            ClientState::Closing | ClientState::Closed => return Err(ClientError::Closed),
            _ => {}
        }
        if inner.cancel.is_cancelled() {
            return Err(ClientError::Closed);
        }

        inner.registry.set_state(ClientState::Connecting);
        let result = tokio::select! {
            biased;
            _ = inner.cancel.cancelled() => Err(ClientError::Closed),
            result = inner.connect_once() => result,
        };
        let transport = match result {
            Ok(transport) => transport,
            Err(e) => {
                inner.registry.set_state(ClientState::Idle);
                return Err(e);
            }
        };

        lifecycle.read_loop = Some(spawn_read_loop(inner.clone(), transport));
        lifecycle.guard = Some(tokio::spawn(reconnect_guard(inner.clone())));

        let watched = inner.clone();
        tokio::spawn(async move {
            watched.cancel.cancelled().await;
            if let Err(e) = watched.close().await {
                warn!("Failed to close relay client on cancellation: {}", e);
            }
        });

        info!(
            client_id = %inner.local_id_str,
            "Connected to relay server {}", inner.config.server_address
        );
        Ok(())
    }

    /// Open a virtual connection to `peer_id`.
    ///
    /// Requires an established relay connection. Only one connection per peer
    /// can be open at a time; close or drop the previous handle first.
    pub async fn open_connection(&self, peer_id: &str) -> Result<RelayConn, ClientError> {
        let inner = &self.inner;
        let _lifecycle = inner.lifecycle.lock().await;

        let (remote_id, remote_id_str) = hash_id(peer_id);
        let (generation, messages) = inner
            .registry
            .open(&remote_id_str, inner.config.delivery_capacity)?;

        info!(
            client_id = %inner.local_id_str,
            "Opened connection to peer {} ({})", peer_id, remote_id_str
        );
        Ok(RelayConn::new(
            inner.clone(),
            remote_id,
            remote_id_str,
            generation,
            messages,
        ))
    }

    /// Close the client and every open connection.
    ///
    /// Idempotent. Returns the error from closing the physical connection, if
    /// any. A closed client cannot be connected again.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.inner.close().await
    }

    /// Current lifecycle state
    pub fn state(&self) -> ClientState {
        self.inner.registry.state()
    }

    /// Whether the relay connection is currently established
    pub fn is_connected(&self) -> bool {
        self.state().is_established()
    }

    /// Printable hashed id of this client
    pub fn local_id(&self) -> &str {
        &self.inner.local_id_str
    }

    /// Address of the relay server
    pub fn server_address(&self) -> &str {
        self.inner.server_address()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        // Lets the watcher tear down the background tasks
        self.inner.cancel.cancel();
    }
}

impl Inner {
    pub(crate) fn server_address(&self) -> &str {
        &self.config.server_address
    }

    /// Dial and handshake once. Caller holds the lifecycle lock.
    async fn connect_once(&self) -> Result<Arc<dyn RelayTransport>, ClientError> {
        let transport = self
            .dialer
            .dial(&self.config.server_address)
            .await
            .map_err(|e| {
                error!(
                    "Failed to dial relay server {}: {}",
                    self.config.server_address, e
                );
                e
            })?;

        if let Err(e) = handshake(
            transport.as_ref(),
            &self.local_id,
            self.config.handshake_timeout,
            self.config.read_buffer_size,
        )
        .await
        {
            if let Err(close_err) = transport.close().await {
                debug!("Failed to close connection after handshake error: {}", close_err);
            }
            return Err(e);
        }

        self.registry.establish(transport.clone());
        Ok(transport)
    }

    pub(crate) async fn write_to(
        &self,
        id: &str,
        dst: &PeerId,
        payload: &[u8],
    ) -> Result<usize, ClientError> {
        let transport = self.registry.write_target(id)?;
        let msg = marshal_transport_msg(dst, payload);

        transport.send(&msg).await.map_err(|e| {
            error!("Failed to write transport message to {}: {}", id, e);
            e
        })?;
        Ok(payload.len())
    }

    pub(crate) fn close_connection(&self, id: &str, generation: u64) -> Result<(), ClientError> {
        self.registry.remove(id, generation)
    }

    async fn close(&self) -> Result<(), ClientError> {
        // Interrupts a reconnect attempt holding the lifecycle lock
        self.cancel.cancel();
        let mut lifecycle = self.lifecycle.lock().await;

        let transport = match self.registry.begin_close() {
            CloseAction::NotRunning => return Ok(()),
            CloseAction::Shutdown(transport) => transport,
        };

        let mut result = Ok(());
        if let Some(transport) = transport {
            if let Err(e) = transport.close().await {
                error!("Failed to close relay connection: {}", e);
                result = Err(e.into());
            }
        }

        if let Some(read_loop) = lifecycle.read_loop.take() {
            read_loop.stop.cancel();
            if let Err(e) = read_loop.task.await {
                error!("Read loop task failed: {}", e);
            }
        }
        if let Some(guard) = lifecycle.guard.take() {
            if let Err(e) = guard.await {
                error!("Reconnection guard task failed: {}", e);
            }
        }

        self.registry.finish_close();
        info!(client_id = %self.local_id_str, "Relay client closed");
        result
    }
}

fn spawn_read_loop(inner: Arc<Inner>, transport: Arc<dyn RelayTransport>) -> ReadLoopHandle {
    // Stopped only by close, after the transport was handed over
    let stop = CancellationToken::new();
    let task = tokio::spawn(read_loop(inner, transport, stop.clone()));
    ReadLoopHandle { stop, task }
}

async fn read_loop(inner: Arc<Inner>, transport: Arc<dyn RelayTransport>, stop: CancellationToken) {
    let mut buf = vec![0u8; inner.config.read_buffer_size];

    loop {
        let n = tokio::select! {
            _ = stop.cancelled() => break,
            result = transport.recv(&mut buf) => match result {
                Ok(n) => n,
                Err(e) => {
                    if inner.registry.state().is_established() {
                        error!("Failed to read message from relay server: {}", e);
                    }
                    break;
                }
            },
        };
        let msg = &buf[..n];

        let msg_type = match determine_server_msg_type(msg) {
            Ok(msg_type) => msg_type,
            Err(e) => {
                error!("Failed to determine message type: {}", e);
                continue;
            }
        };
        if msg_type != MsgType::Transport {
            error!("Unexpected message type: {}", msg_type);
            continue;
        }

        let peer_id = match unmarshal_transport_id(msg) {
            Ok(id) => hash_id_to_string(&id),
            Err(e) => {
                error!("Failed to parse transport message: {}", e);
                continue;
            }
        };

        let Some(delivery) = inner.registry.delivery(&peer_id) else {
            debug!("Peer not found: {}", peer_id);
            continue;
        };

        let msg = Msg {
            buf: Bytes::copy_from_slice(msg),
        };
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = delivery.closed.cancelled() => {
                debug!("Connection to {} closed, dropping message", peer_id);
            }
            result = delivery.messages.send(msg) => {
                if result.is_err() {
                    debug!("Connection to {} closed, dropping message", peer_id);
                }
            }
        }
    }

    if let Some(transport) = inner.registry.teardown() {
        if let Err(e) = transport.close().await {
            debug!("Failed to close relay connection: {}", e);
        }
    }
    trace!("Exit from read loop");
    inner.read_loop_exited.notify_one();
}

async fn reconnect_guard(inner: Arc<Inner>) {
    loop {
        tokio::select! {
            biased;
            _ = inner.cancel.cancelled() => return,
            _ = inner.read_loop_exited.notified() => {}
        }

        loop {
            let mut lifecycle = tokio::select! {
                biased;
                _ = inner.cancel.cancelled() => return,
                lifecycle = inner.lifecycle.lock() => lifecycle,
            };
            if !inner.registry.state().is_running() {
                return;
            }

            if let Some(previous) = lifecycle.read_loop.take() {
                let _ = previous.task.await;
            }

            info!(
                client_id = %inner.local_id_str,
                "Reconnecting to relay server {}", inner.config.server_address
            );
            let result = tokio::select! {
                biased;
                _ = inner.cancel.cancelled() => return,
                result = inner.connect_once() => result,
            };

            match result {
                Ok(transport) => {
                    lifecycle.read_loop = Some(spawn_read_loop(inner.clone(), transport));
                    info!(
                        client_id = %inner.local_id_str,
                        "Reconnected to relay server {}", inner.config.server_address
                    );
                    break;
                }
                Err(e) => {
                    warn!(
                        client_id = %inner.local_id_str,
                        "Failed to reconnect to relay server, retrying in {:?}: {}",
                        inner.config.reconnect_interval, e
                    );
                    drop(lifecycle);
                    tokio::select! {
                        biased;
                        _ = inner.cancel.cancelled() => return,
                        _ = tokio::time::sleep(inner.config.reconnect_interval) => {}
                    }
                }
            }
        }
    }
}
