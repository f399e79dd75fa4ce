//! Registry of open virtual connections and the client's connection state.
//!
//! The map of open connections, the lifecycle state and the current transport
//! share one lock so that a reader can never observe a half torn down entry
//! and the state can never disagree with the transport being present.

use crate::transport::RelayTransport;
use crate::ClientError;
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Lifecycle of the relay client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Never connected, or the first connect failed
    Idle,
    /// Running without an established relay connection (dialing or retrying)
    Connecting,
    /// Handshake completed, read loop active
    Connected,
    /// Close in progress
    Closing,
    /// Terminal state
    Closed,
}

impl ClientState {
    /// Whether reconnection is still wanted
    pub fn is_running(self) -> bool {
        matches!(self, ClientState::Connecting | ClientState::Connected)
    }

    /// Whether the relay connection is usable
    pub fn is_established(self) -> bool {
        self == ClientState::Connected
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClientState::Idle => "idle",
            ClientState::Connecting => "connecting",
            ClientState::Connected => "connected",
            ClientState::Closing => "closing",
            ClientState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// A Transport message queued for a virtual connection
#[derive(Debug, Clone)]
pub(crate) struct Msg {
    pub(crate) buf: Bytes,
}

struct ConnEntry {
    generation: u64,
    messages: mpsc::Sender<Msg>,
    closed: CancellationToken,
}

/// Delivery side of a virtual connection, handed to the read loop
pub(crate) struct Delivery {
    pub(crate) messages: mpsc::Sender<Msg>,
    /// Fires when the owning handle is closed, releasing a blocked push
    pub(crate) closed: CancellationToken,
}

struct RegistryState {
    state: ClientState,
    transport: Option<Arc<dyn RelayTransport>>,
    conns: HashMap<String, ConnEntry>,
    next_generation: u64,
}

/// What `begin_close` decided
pub(crate) enum CloseAction {
    /// Nothing was running
    NotRunning,
    /// Shut down, closing this transport if any
    Shutdown(Option<Arc<dyn RelayTransport>>),
}

pub(crate) struct Registry {
    inner: Mutex<RegistryState>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryState {
                state: ClientState::Idle,
                transport: None,
                conns: HashMap::new(),
                next_generation: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> ClientState {
        self.lock().state
    }

    pub(crate) fn set_state(&self, state: ClientState) {
        self.lock().state = state;
    }

    /// Record a freshly handshaken transport
    pub(crate) fn establish(&self, transport: Arc<dyn RelayTransport>) {
        let mut inner = self.lock();
        inner.transport = Some(transport);
        inner.state = ClientState::Connected;
    }

    /// Start closing: running clients move to `Closing` and hand over their
    /// transport, idle ones become `Closed` directly
    pub(crate) fn begin_close(&self) -> CloseAction {
        let mut inner = self.lock();
        let state = inner.state;
        match state {
            state if state.is_running() => {
                inner.state = ClientState::Closing;
                CloseAction::Shutdown(inner.transport.take())
            }
            ClientState::Idle => {
                inner.state = ClientState::Closed;
                CloseAction::NotRunning
            }
            _ => CloseAction::NotRunning,
        }
    }

    pub(crate) fn finish_close(&self) {
        let mut inner = self.lock();
        inner.state = ClientState::Closed;
        inner.transport = None;
        inner.conns.clear();
    }

    /// Drop every entry after the physical connection ended.
    ///
    /// Returns the transport if the client was still connected, so the
    /// caller can close it; a client being closed already gave it up.
    pub(crate) fn teardown(&self) -> Option<Arc<dyn RelayTransport>> {
        let mut inner = self.lock();
        // Dropping the senders ends every virtual connection's stream
        inner.conns.clear();
        let transport = inner.transport.take();
        if inner.state == ClientState::Connected {
            inner.state = ClientState::Connecting;
            transport
        } else {
            None
        }
    }

    /// Register a virtual connection to `id`
    pub(crate) fn open(
        &self,
        id: &str,
        capacity: usize,
    ) -> Result<(u64, mpsc::Receiver<Msg>), ClientError> {
        let mut inner = self.lock();
        if !inner.state.is_established() {
            return Err(ClientError::NotConnected);
        }
        if inner.conns.contains_key(id) {
            return Err(ClientError::AlreadyOpen(id.to_string()));
        }

        let (tx, rx) = mpsc::channel(capacity.max(1));
        let generation = inner.next_generation;
        inner.next_generation += 1;
        inner.conns.insert(
            id.to_string(),
            ConnEntry {
                generation,
                messages: tx,
                closed: CancellationToken::new(),
            },
        );
        Ok((generation, rx))
    }

    /// Remove the entry for `id` if it still belongs to `generation`
    pub(crate) fn remove(&self, id: &str, generation: u64) -> Result<(), ClientError> {
        let mut inner = self.lock();
        let current = inner
            .conns
            .get(id)
            .is_some_and(|entry| entry.generation == generation);
        if !current {
            return Err(ClientError::AlreadyClosed);
        }
        if let Some(entry) = inner.conns.remove(id) {
            entry.closed.cancel();
        }
        Ok(())
    }

    /// Delivery queue of the connection open to `id`
    pub(crate) fn delivery(&self, id: &str) -> Option<Delivery> {
        self.lock().conns.get(id).map(|entry| Delivery {
            messages: entry.messages.clone(),
            closed: entry.closed.clone(),
        })
    }

    /// Transport to write to on behalf of the connection open to `id`
    pub(crate) fn write_target(&self, id: &str) -> Result<Arc<dyn RelayTransport>, ClientError> {
        let inner = self.lock();
        if !inner.conns.contains_key(id) {
            return Err(ClientError::EndOfStream);
        }
        inner.transport.clone().ok_or(ClientError::EndOfStream)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lock().conns.len()
    }
}
