//! Encoding and decoding of relay messages.
//!
//! All functions operate on a single complete message; the transport below
//! preserves message boundaries.

use crate::header::MsgType;
use crate::id::{PeerId, ID_LENGTH};
use crate::WireError;
use bytes::{BufMut, Bytes, BytesMut};

/// Type byte plus peer id
pub const TRANSPORT_HEADER_SIZE: usize = 1 + ID_LENGTH;

/// Build a Hello message announcing the client's hashed id
pub fn marshal_hello_msg(peer_id: &[u8]) -> Result<Bytes, WireError> {
    if peer_id.len() != ID_LENGTH {
        return Err(WireError::InvalidIdLength(peer_id.len()));
    }

    let mut buf = BytesMut::with_capacity(1 + ID_LENGTH);
    buf.put_u8(MsgType::Hello as u8);
    buf.put_slice(peer_id);
    Ok(buf.freeze())
}

/// Extract the hashed id from a Hello message
pub fn unmarshal_hello_msg(msg: &[u8]) -> Result<PeerId, WireError> {
    if msg.len() < 1 + ID_LENGTH {
        return Err(WireError::InvalidLength(msg.len()));
    }
    read_id(&msg[1..1 + ID_LENGTH])
}

/// Build a HelloResponse message
pub fn marshal_hello_response() -> Bytes {
    Bytes::from_static(&[MsgType::HelloResponse as u8])
}

/// Build a Transport message addressed to `peer_id`
pub fn marshal_transport_msg(peer_id: &PeerId, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(TRANSPORT_HEADER_SIZE + payload.len());
    buf.put_u8(MsgType::Transport as u8);
    buf.put_slice(peer_id);
    buf.put_slice(payload);
    buf.freeze()
}

/// Extract the peer id from a Transport message
pub fn unmarshal_transport_id(msg: &[u8]) -> Result<PeerId, WireError> {
    if msg.len() < TRANSPORT_HEADER_SIZE {
        return Err(WireError::InvalidLength(msg.len()));
    }
    read_id(&msg[1..TRANSPORT_HEADER_SIZE])
}

/// Borrow the payload of a Transport message
pub fn unmarshal_transport_payload(msg: &[u8]) -> Result<&[u8], WireError> {
    if msg.len() < TRANSPORT_HEADER_SIZE {
        return Err(WireError::InvalidLength(msg.len()));
    }
    Ok(&msg[TRANSPORT_HEADER_SIZE..])
}

fn read_id(raw: &[u8]) -> Result<PeerId, WireError> {
    raw.try_into()
        .map_err(|_| WireError::InvalidIdLength(raw.len()))
}
