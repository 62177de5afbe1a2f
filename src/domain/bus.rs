// src/domain/bus.rs

//! Message-bus domain abstractions.
//!
//! This module defines the domain-level bus interface used by the publisher,
//! the gateway bridge, and the per-service event consumers. It intentionally
//! avoids any reference to concrete brokers or client libraries.
//!
//! The bus is responsible only for delivering opaque message bodies, tagged
//! with their routing key, to the queues bound to that key. Higher-level
//! semantics such as envelope decoding, fan-out to client connections, or
//! RPC correlation are handled elsewhere.
//!
//! Concrete implementations live under `src/transport/`.

use crate::Result;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A dot-separated routing key identifying an event or command's semantic
/// type (`<domain>.<cmd|event>.<name>`, e.g. `trip.event.created`).
///
/// Routing keys are immutable, cheap to clone, and safe to share across
/// tasks. Matching is exact: the in-memory bus defines the reference
/// semantics, and the AMQP bus binds each key verbatim (no wildcards).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RoutingKey(pub Arc<str>);

impl<T> From<T> for RoutingKey
where
    T: Into<Arc<str>>,
{
    fn from(value: T) -> Self {
        // ---
        RoutingKey(value.into())
    }
}

impl RoutingKey {
    /// Borrow the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A named queue on the bus.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QueueName(pub Arc<str>);

impl<T> From<T> for QueueName
where
    T: Into<Arc<str>>,
{
    fn from(value: T) -> Self {
        // ---
        QueueName(value.into())
    }
}

impl QueueName {
    /// Borrow the queue name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A queue plus the routing keys it is bound to.
///
/// Subscribing with a binding declares the queue (if needed), binds every
/// listed key, and starts a single consumer for the queue.
#[derive(Clone, Debug)]
pub struct QueueBinding {
    pub queue: QueueName,
    pub keys: Vec<RoutingKey>,
}

impl QueueBinding {
    pub fn new(queue: impl Into<QueueName>, keys: &[&str]) -> Self {
        // ---
        Self {
            queue: queue.into(),
            keys: keys.iter().map(|k| RoutingKey::from(*k)).collect(),
        }
    }
}

/// One raw message delivered from a bound queue.
///
/// The body is opaque at this level; decoding into an
/// [`EventEnvelope`](crate::EventEnvelope) happens in the consumers so that
/// a malformed body can be skipped without disturbing the delivery loop.
#[derive(Clone, Debug)]
pub struct Delivery {
    /// Routing key the message was published with.
    pub routing_key: RoutingKey,
    /// Opaque message body.
    pub body: Bytes,
}

/// Handle returned from a successful subscription.
///
/// The subscription remains active until either the handle is dropped
/// (receiver channel closes) or the bus is closed. Per queue, deliveries
/// arrive in the order the broker delivered them; no reordering is
/// introduced here.
pub struct SubscriptionHandle {
    /// Receiver channel for deliveries on the bound queue.
    pub inbox: mpsc::Receiver<Delivery>,
}

/// Message-bus abstraction.
///
/// A `MessageBus` provides best-effort delivery of opaque message bodies
/// from publishers to the queues bound to the message's routing key.
///
/// Implementations must ensure that:
/// - Once `subscribe()` returns successfully, messages published *after*
///   that point with a bound key are deliverable to the returned inbox.
/// - `publish()` is safe to call concurrently from multiple tasks.
/// - A queue is consumed by at most one delivery task; per-queue ordering
///   is preserved as delivered by the underlying broker.
/// - `close()` is idempotent.
#[async_trait::async_trait]
pub trait MessageBus: Send + Sync {
    // ---
    /// Identifier for this bus instance, used in logs.
    fn bus_id(&self) -> &str;

    /// Publish an opaque body under the given routing key.
    async fn publish(&self, key: RoutingKey, body: Bytes) -> Result<()>;

    /// Declare and bind a queue, returning a handle for its deliveries.
    async fn subscribe(&self, binding: QueueBinding) -> Result<SubscriptionHandle>;

    /// Close the bus and release the underlying connection. Idempotent.
    async fn close(&self) -> Result<()>;
}

/// Shared bus pointer.
///
/// An `Arc<dyn MessageBus>`: `.clone()` is cheap, clones share the same
/// underlying connection, and concrete bus types stay hidden behind a
/// stable domain interface.
pub type BusPtr = Arc<dyn MessageBus>;
