//! Handshake protocol for relay connections.
//!
//! This module implements the HELLO exchange that occurs immediately after
//! the transport is dialed: the client announces its hashed id and the
//! server must answer with a HelloResponse within a bounded time.

use crate::transport::RelayTransport;
use crate::ClientError;
use relay_wire::{determine_server_msg_type, marshal_hello_msg, MsgType, PeerId};
use std::time::Duration;
use tracing::{debug, error};

/// Send a HELLO message carrying the local hashed id
pub async fn send_hello(
    transport: &dyn RelayTransport,
    local_id: &PeerId,
) -> Result<(), ClientError> {
    let msg = marshal_hello_msg(local_id).map_err(|e| {
        error!("Failed to marshal hello message: {}", e);
        e
    })?;

    transport.send(&msg).await.map_err(|e| {
        error!("Failed to send hello message: {}", e);
        e
    })?;

    debug!("Sent HELLO ({} bytes)", msg.len());
    Ok(())
}

/// Wait for the server's HelloResponse.
///
/// The timeout bounds this single receive only; the transport itself carries
/// no deadline afterwards.
pub async fn recv_hello_response(
    transport: &dyn RelayTransport,
    timeout: Duration,
    buf: &mut [u8],
) -> Result<(), ClientError> {
    let n = match tokio::time::timeout(timeout, transport.recv(buf)).await {
        Ok(Ok(n)) => n,
        Ok(Err(e)) => {
            error!("Failed to read hello response: {}", e);
            return Err(e.into());
        }
        Err(_) => {
            error!("No hello response within {:?}", timeout);
            return Err(ClientError::HandshakeTimeout);
        }
    };

    let msg_type = determine_server_msg_type(&buf[..n]).map_err(|e| {
        error!("Failed to determine message type: {}", e);
        e
    })?;

    if msg_type != MsgType::HelloResponse {
        error!("Unexpected message type: {}", msg_type);
        return Err(ClientError::UnexpectedMessage(msg_type));
    }

    debug!("Received HELLO response");
    Ok(())
}

/// Run the full handshake on a freshly dialed transport
pub async fn handshake(
    transport: &dyn RelayTransport,
    local_id: &PeerId,
    timeout: Duration,
    buf_size: usize,
) -> Result<(), ClientError> {
    send_hello(transport, local_id).await?;

    let mut buf = vec![0u8; buf_size];
    recv_hello_response(transport, timeout, &mut buf).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::memory_pair;
    use relay_wire::{
        hash_id, marshal_hello_response, marshal_transport_msg, unmarshal_hello_msg, WireError,
    };

    const TIMEOUT: Duration = Duration::from_secs(8);

    #[tokio::test]
    async fn test_handshake_accepted() {
        let (client, server) = memory_pair();
        let (local_id, _) = hash_id("alice");

        let relay = tokio::spawn(async move {
            let mut buf = [0u8; 128];
            let n = server.recv(&mut buf).await.unwrap();
            let hello_id = unmarshal_hello_msg(&buf[..n]).unwrap();
            server.send(&marshal_hello_response()).await.unwrap();
            hello_id
        });

        handshake(client.as_ref(), &local_id, TIMEOUT, 1500)
            .await
            .unwrap();
        assert_eq!(relay.await.unwrap(), local_id);
    }

    #[tokio::test]
    async fn test_handshake_wrong_type() {
        let (client, server) = memory_pair();
        let (local_id, _) = hash_id("alice");

        tokio::spawn(async move {
            let mut buf = [0u8; 128];
            server.recv(&mut buf).await.unwrap();
            server
                .send(&marshal_transport_msg(&local_id, b"not a response"))
                .await
                .unwrap();
        });

        let err = handshake(client.as_ref(), &local_id, TIMEOUT, 1500)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::UnexpectedMessage(MsgType::Transport)));
    }

    #[tokio::test]
    async fn test_handshake_garbage_reply() {
        let (client, server) = memory_pair();
        let (local_id, _) = hash_id("alice");

        tokio::spawn(async move {
            let mut buf = [0u8; 128];
            server.recv(&mut buf).await.unwrap();
            server.send(&[0x42, 0x42]).await.unwrap();
        });

        let err = handshake(client.as_ref(), &local_id, TIMEOUT, 1500)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Wire(WireError::Type(0x42))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_timeout() {
        let (client, _server) = memory_pair();
        let (local_id, _) = hash_id("alice");

        let err = handshake(client.as_ref(), &local_id, TIMEOUT, 1500)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::HandshakeTimeout));
    }

    #[tokio::test]
    async fn test_handshake_closed_transport() {
        let (client, server) = memory_pair();
        let (local_id, _) = hash_id("alice");
        server.sever();

        let err = handshake(client.as_ref(), &local_id, TIMEOUT, 1500)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Io(_)));
    }
}
