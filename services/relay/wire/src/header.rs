//! Message type byte and classification.
//!
//! The relay protocol has no framing beyond the datagram itself, so the first
//! byte of every received buffer decides how the rest is interpreted.

use crate::WireError;
use std::fmt;

/// Message types as defined in the relay protocol
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgType {
    /// Client greeting carrying the client's hashed id
    Hello = 0x00,
    /// Server acknowledgement of a Hello
    HelloResponse = 0x01,
    /// Payload addressed to (or received from) a peer
    Transport = 0x02,
}

impl TryFrom<u8> for MsgType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(MsgType::Hello),
            0x01 => Ok(MsgType::HelloResponse),
            0x02 => Ok(MsgType::Transport),
            _ => Err(WireError::Type(value)),
        }
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MsgType::Hello => write!(f, "hello"),
            MsgType::HelloResponse => write!(f, "hello response"),
            MsgType::Transport => write!(f, "transport"),
        }
    }
}

/// Classify a buffer received from the relay server.
///
/// Only `HelloResponse` and `Transport` are valid in this direction.
pub fn determine_server_msg_type(msg: &[u8]) -> Result<MsgType, WireError> {
    let typ = first_byte(msg)?;
    match MsgType::try_from(typ)? {
        t @ (MsgType::HelloResponse | MsgType::Transport) => Ok(t),
        MsgType::Hello => Err(WireError::Type(typ)),
    }
}

/// Classify a buffer received from a client.
///
/// Only `Hello` and `Transport` are valid in this direction.
pub fn determine_client_msg_type(msg: &[u8]) -> Result<MsgType, WireError> {
    let typ = first_byte(msg)?;
    match MsgType::try_from(typ)? {
        t @ (MsgType::Hello | MsgType::Transport) => Ok(t),
        MsgType::HelloResponse => Err(WireError::Type(typ)),
    }
}

fn first_byte(msg: &[u8]) -> Result<u8, WireError> {
    msg.first().copied().ok_or(WireError::Empty)
}
