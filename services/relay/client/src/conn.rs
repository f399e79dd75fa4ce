//! Virtual connection to a single remote peer, multiplexed over the relay.

use crate::client::Inner;
use crate::registry::Msg;
use crate::ClientError;
use relay_wire::{unmarshal_transport_payload, PeerId};
use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// Byte stream to one remote peer.
///
/// Each received Transport message is one chunk; [`RelayConn::read`] copies as
/// much of the chunk as fits and discards the rest. Reads return `Ok(0)` once
/// the connection was closed and everything already queued has been drained,
/// either because the handle was closed or because the relay connection was
/// lost.
pub struct RelayConn {
    client: Arc<Inner>,
    remote_id: PeerId,
    remote_id_str: String,
    generation: u64,
    messages: Mutex<mpsc::Receiver<Msg>>,
    closed: AtomicBool,
}

impl RelayConn {
    pub(crate) fn new(
        client: Arc<Inner>,
        remote_id: PeerId,
        remote_id_str: String,
        generation: u64,
        messages: mpsc::Receiver<Msg>,
    ) -> Self {
        Self {
            client,
            remote_id,
            remote_id_str,
            generation,
            messages: Mutex::new(messages),
            closed: AtomicBool::new(false),
        }
    }

    /// Read the next payload from the peer into `buf`
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize, ClientError> {
        let mut messages = self.messages.lock().await;
        loop {
            let Some(msg) = messages.recv().await else {
                return Ok(0);
            };

            let payload = unmarshal_transport_payload(&msg.buf)?;
            if payload.is_empty() {
                continue;
            }

            let n = payload.len().min(buf.len());
            buf[..n].copy_from_slice(&payload[..n]);
            return Ok(n);
        }
    }

    /// Send `payload` to the peer as one Transport message
    pub async fn write(&self, payload: &[u8]) -> Result<usize, ClientError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ClientError::EndOfStream);
        }
        self.client
            .write_to(&self.remote_id_str, &self.remote_id, payload)
            .await
    }

    /// Close the connection.
    ///
    /// Fails with [`ClientError::AlreadyClosed`] on the second call, or when
    /// the relay connection was lost in the meantime and the entry is gone.
    pub fn close(&self) -> Result<(), ClientError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(ClientError::AlreadyClosed);
        }
        debug!("Closing connection to peer {}", self.remote_id_str);
        self.client
            .close_connection(&self.remote_id_str, self.generation)
    }

    /// Printable id of the remote peer
    pub fn remote_id(&self) -> &str {
        &self.remote_id_str
    }

    /// Address of the relay server carrying this connection
    pub fn server_address(&self) -> &str {
        self.client.server_address()
    }
}

impl AsyncRead for RelayConn {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let messages = self.get_mut().messages.get_mut();
        loop {
            let Some(msg) = ready!(messages.poll_recv(cx)) else {
                return Poll::Ready(Ok(()));
            };

            let payload = unmarshal_transport_payload(&msg.buf)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            if payload.is_empty() {
                continue;
            }

            let n = payload.len().min(buf.remaining());
            buf.put_slice(&payload[..n]);
            return Poll::Ready(Ok(()));
        }
    }
}

impl Drop for RelayConn {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            // The entry may already be gone after a teardown
            let _ = self
                .client
                .close_connection(&self.remote_id_str, self.generation);
        }
    }
}

impl fmt::Debug for RelayConn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConn")
            .field("remote_id", &self.remote_id_str)
            .field("server_address", &self.client.server_address())
            .field("generation", &self.generation)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}
