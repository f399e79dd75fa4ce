//! Basic usage example for the relay wire protocol.

use relay_wire::{
    determine_client_msg_type, determine_server_msg_type, hash_id, hash_id_to_string,
    marshal_hello_msg, marshal_hello_response, marshal_transport_msg, unmarshal_hello_msg,
    unmarshal_transport_id, unmarshal_transport_payload,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Relay Wire Protocol Example ===\n");

    // 1. Hash the local and remote peer IDs
    println!("1. Hashing peer IDs...");
    let (alice, alice_str) = hash_id("alice");
    let (bob, bob_str) = hash_id("bob");
    println!("   alice -> {}", alice_str);
    println!("   bob   -> {}", bob_str);

    // 2. Handshake
    println!("\n2. Handshake...");
    let hello = marshal_hello_msg(&alice)?;
    println!(
        "   client sends {} ({} bytes)",
        determine_client_msg_type(&hello)?,
        hello.len()
    );
    println!(
        "   server sees client {}",
        hash_id_to_string(&unmarshal_hello_msg(&hello)?)
    );
    let response = marshal_hello_response();
    println!("   server replies {}", determine_server_msg_type(&response)?);

    // 3. Transport
    println!("\n3. Sending a payload to bob...");
    let msg = marshal_transport_msg(&bob, b"Hello, relay!");
    println!("   encoded transport message: {} bytes", msg.len());

    let dst = unmarshal_transport_id(&msg)?;
    let payload = unmarshal_transport_payload(&msg)?;
    println!(
        "   decoded: to {} payload {:?}",
        hash_id_to_string(&dst),
        String::from_utf8_lossy(payload)
    );

    println!("\n=== Example completed successfully! ===");
    Ok(())
}
