//! Peer identity hashing.
//!
//! Logical peer IDs are hashed with SHA-256 and prefixed with a short algorithm
//! tag. The binary form goes on the wire; the printable form is used as a map
//! key by clients and servers.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};

/// Algorithm tag prepended to every hashed id
pub const ID_PREFIX: &[u8; 4] = b"sha-";

/// Size of a hashed id on the wire (prefix + SHA-256 digest)
pub const ID_LENGTH: usize = ID_PREFIX.len() + 32;

/// Binary hashed peer identity
pub type PeerId = [u8; ID_LENGTH];

/// Hash a logical peer ID into its binary and printable forms
pub fn hash_id(peer_id: &str) -> (PeerId, String) {
    let digest = Sha256::digest(peer_id.as_bytes());

    let mut id = [0u8; ID_LENGTH];
    id[..ID_PREFIX.len()].copy_from_slice(ID_PREFIX);
    id[ID_PREFIX.len()..].copy_from_slice(&digest);

    let printable = hash_id_to_string(&id);
    (id, printable)
}

/// Printable form of a binary hashed id: the prefix followed by base64 digest
pub fn hash_id_to_string(id: &PeerId) -> String {
    let (prefix, digest) = id.split_at(ID_PREFIX.len());
    format!("{}{}", String::from_utf8_lossy(prefix), STANDARD.encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        let (a, a_str) = hash_id("peer-a");
        let (b, b_str) = hash_id("peer-a");
        assert_eq!(a, b);
        assert_eq!(a_str, b_str);
    }

    #[test]
    fn test_distinct_peers_distinct_ids() {
        let (a, a_str) = hash_id("peer-a");
        let (b, b_str) = hash_id("peer-b");
        assert_ne!(a, b);
        assert_ne!(a_str, b_str);
    }

    #[test]
    fn test_printable_form() {
        let (id, printable) = hash_id("alice");
        assert!(printable.starts_with("sha-"));
        assert_eq!(&id[..4], b"sha-");
        // 32 digest bytes encode to 44 base64 characters
        assert_eq!(printable.len(), 4 + 44);
        assert_eq!(hash_id_to_string(&id), printable);
    }
}
