// src/gateway/mod.rs

//! Gateway-side fabric: the connection registry and the broker → client
//! bridge.
//!
//! The WebSocket/HTTP handshake itself is out of scope; the transport layer
//! is assumed to yield a message channel per connection, which it registers
//! here under the owner's id.

mod queue_consumer;
mod registry;

pub use queue_consumer::QueueConsumer;
pub use registry::{ChannelSink, ClientSink, ConnectionRegistry, SinkPtr};

use crate::{ClientMessage, EventPublisher, Result};

/// Publish a command received from a client connection onto the fabric on
/// the client's behalf.
///
/// Inbound client messages reuse the [`ClientMessage`] shape with `type`
/// holding the command routing key (e.g. a driver accepting a trip sends
/// `driver.cmd.trip_accept`); the connection's owner becomes the envelope
/// owner.
pub async fn forward_client_command(
    publisher: &EventPublisher,
    owner_id: &str,
    msg: ClientMessage,
) -> Result<()> {
    // ---
    publisher.publish(&msg.kind, owner_id, msg.data).await
}
