//! Relay message envelopes, classification and peer identity hashing.
//!
//! Every frame exchanged with the relay server starts with a single type byte.
//! Peers are never addressed by their logical ID on the wire; instead a fixed
//! length hashed identity is used (see [`id`]).
//!
//! ## Wire Format
//!
//! ```text
//! Hello          +------+------------------------+
//!                | 0x00 | peer id (36B)          |
//!                +------+------------------------+
//! HelloResponse  +------+
//!                | 0x01 |
//!                +------+
//! Transport      +------+------------------------+-------------------+
//!                | 0x02 | peer id (36B)          | payload (0..N)    |
//!                +------+------------------------+-------------------+
//! ```
//!
//! The peer id in a Transport frame is the destination when sent by a client
//! and the source when forwarded by the relay server.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod error;
pub mod header;
pub mod id;

// Re-export main types
pub use codec::{
    marshal_hello_msg, marshal_hello_response, marshal_transport_msg, unmarshal_hello_msg,
    unmarshal_transport_id, unmarshal_transport_payload, TRANSPORT_HEADER_SIZE,
};
pub use error::WireError;
pub use header::{determine_client_msg_type, determine_server_msg_type, MsgType};
pub use id::{hash_id, hash_id_to_string, PeerId, ID_LENGTH, ID_PREFIX};
