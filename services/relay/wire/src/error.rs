//! Wire protocol error types.

use thiserror::Error;

/// Wire protocol errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Empty buffer, no type byte to classify
    #[error("empty message")]
    Empty,

    /// Unknown or unexpected message type
    #[error("invalid msg type {0}")]
    Type(u8),

    /// Buffer too short for the declared message type
    #[error("invalid message length: {0}")]
    InvalidLength(usize),

    /// Hashed peer id has the wrong size
    #[error("invalid peer id length: {0}")]
    InvalidIdLength(usize),
}
