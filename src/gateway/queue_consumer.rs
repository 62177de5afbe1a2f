// src/gateway/queue_consumer.rs

//! Broker → client bridge.
//!
//! One `QueueConsumer` binds one named queue and forwards every decodable
//! event to the owning user's live connection through the
//! [`ConnectionRegistry`]. This is the asynchronous-to-realtime seam of the
//! gateway.
//!
//! Every per-message failure is contained here: malformed envelopes,
//! non-structured payloads, disconnected owners, and slow or dead client
//! sinks are each logged and skipped without stopping the loop. A message
//! destined for a disconnected user is dropped, not retried and not
//! dead-lettered — clients re-sync state on reconnect.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::{
    // ---
    log_debug,
    log_warn,
    reshape_payload,
    BusPtr,
    ClientMessage,
    ConnectionRegistry,
    Delivery,
    Error,
    EventEnvelope,
    QueueBinding,
    Result,
    SinkError,
};

/// Consumes one gateway queue and fans deliveries out to client
/// connections.
pub struct QueueConsumer {
    // ---
    bus: BusPtr,
    registry: Arc<ConnectionRegistry>,
    binding: QueueBinding,
}

impl QueueConsumer {
    pub fn new(bus: BusPtr, registry: Arc<ConnectionRegistry>, binding: QueueBinding) -> Self {
        // ---
        Self {
            bus,
            registry,
            binding,
        }
    }

    /// Bind the queue and spawn the delivery loop.
    ///
    /// The loop runs until the underlying channel closes (bus shutdown);
    /// it exposes no individual cancellation.
    pub async fn start(self) -> Result<JoinHandle<()>> {
        // ---
        let _queue = self.binding.queue.as_str().to_string();
        let mut handle = self.bus.subscribe(self.binding.clone()).await?;

        Ok(tokio::spawn(async move {
            while let Some(delivery) = handle.inbox.recv().await {
                self.process(delivery).await;
            }
            log_debug!("queue consumer stopped: {_queue}");
        }))
    }

    async fn process(&self, delivery: Delivery) {
        // ---
        let _queue = self.binding.queue.as_str();

        let envelope = match EventEnvelope::decode(&delivery.body) {
            Ok(env) => env,
            Err(_err) => {
                log_warn!("{_queue}: failed to decode envelope: {_err}");
                return;
            }
        };

        // Payloads must be self-describing structured values; some routing
        // keys extract a nested field.
        let data = match envelope.data {
            Some(value) if !value.is_object() && !value.is_array() => {
                log_warn!(
                    "{_queue}: payload for {} is not a structured value",
                    envelope.kind
                );
                return;
            }
            Some(value) => Some(reshape_payload(&envelope.kind, value)),
            None => None,
        };

        let msg = ClientMessage {
            kind: envelope.kind.clone(),
            data,
        };

        log_debug!(
            "{_queue}: forwarding {} to {}",
            envelope.kind,
            envelope.owner_id
        );

        match self.registry.send(&envelope.owner_id, msg).await {
            Ok(()) => {}
            Err(Error::NotConnected(_)) => {
                // Expected steady-state: the owner has no live connection.
                log_debug!(
                    "{_queue}: owner {} not connected, dropping {}",
                    envelope.owner_id,
                    envelope.kind
                );
            }
            Err(Error::Delivery(SinkError::Closed)) => {
                // Stale entry; evict so we stop hammering a dead sink.
                log_warn!(
                    "{_queue}: connection for {} closed, evicting (kind: {})",
                    envelope.owner_id,
                    envelope.kind
                );
                self.registry.remove(&envelope.owner_id).await;
            }
            Err(_err) => {
                log_warn!(
                    "{_queue}: failed to deliver {} to {}: {_err}",
                    envelope.kind,
                    envelope.owner_id
                );
            }
        }
    }
}
