// src/publisher.rs

//! Domain event publisher.
//!
//! Thin, deliberately retry-free: publish failures are returned to the
//! calling domain logic, which alone knows whether the event is safe to
//! duplicate.

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

use crate::{log_debug, BusPtr, EventEnvelope, Result, RoutingKey};

/// Publishes [`EventEnvelope`]s addressed by routing key.
#[derive(Clone)]
pub struct EventPublisher {
    // ---
    bus: BusPtr,
}

impl EventPublisher {
    pub fn new(bus: BusPtr) -> Self {
        Self { bus }
    }

    /// Publish an event with an opaque structured payload.
    ///
    /// `kind` is both the envelope kind and the routing key; an empty kind
    /// is rejected before anything reaches the wire.
    pub async fn publish(&self, kind: &str, owner_id: &str, data: Option<Value>) -> Result<()> {
        // ---
        let envelope = EventEnvelope::new(owner_id, kind, data)?;
        let body = envelope.encode()?;

        log_debug!("publish {kind} (owner: {owner_id})");
        self.bus
            .publish(RoutingKey::from(kind), Bytes::from(body))
            .await
    }

    /// Publish an event with a typed payload document.
    pub async fn publish_json<T: Serialize>(
        &self,
        kind: &str,
        owner_id: &str,
        payload: &T,
    ) -> Result<()> {
        // ---
        let data = serde_json::to_value(payload)?;
        self.publish(kind, owner_id, Some(data)).await
    }
}
