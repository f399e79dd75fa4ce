//! Client error types.

use relay_wire::{MsgType, WireError};
use thiserror::Error;

/// Errors surfaced to callers of the relay client
#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport I/O failure (dial, send or receive)
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or unclassifiable message
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// No HelloResponse within the handshake timeout
    #[error("timed out waiting for hello response")]
    HandshakeTimeout,

    /// The server answered the Hello with something else
    #[error("unexpected message type: {0}")]
    UnexpectedMessage(MsgType),

    /// The relay connection is not established
    #[error("relay connection is not established")]
    NotConnected,

    /// A virtual connection to this peer is already open
    #[error("connection to peer {0} is already open")]
    AlreadyOpen(String),

    /// The virtual connection was already closed
    #[error("connection already closed")]
    AlreadyClosed,

    /// The virtual connection no longer exists
    #[error("end of stream")]
    EndOfStream,

    /// The client has been closed and cannot be reused
    #[error("relay client is closed")]
    Closed,
}

impl From<ClientError> for std::io::Error {
    fn from(err: ClientError) -> Self {
        use std::io::ErrorKind;

        match err {
            ClientError::Io(e) => e,
            eos @ (ClientError::EndOfStream | ClientError::AlreadyClosed) => {
                std::io::Error::new(ErrorKind::BrokenPipe, eos)
            }
            down @ (ClientError::NotConnected | ClientError::Closed) => {
                std::io::Error::new(ErrorKind::NotConnected, down)
            }
            timeout @ ClientError::HandshakeTimeout => {
                std::io::Error::new(ErrorKind::TimedOut, timeout)
            }
            other => std::io::Error::new(ErrorKind::InvalidData, other),
        }
    }
}
