// src/gateway/registry.rs

//! Per-process routing table from owner id to live client connection.
//!
//! The registry is the only structure mutated by multiple concurrent tasks
//! in the gateway: every queue-consumer task resolves targets through it,
//! and the connection layer registers/removes entries as client transports
//! come and go. All three operations are linearizable with respect to each
//! other — a `send` racing a `register`/`remove` for the same key observes
//! either the old or the new sink, never a torn state.
//!
//! The write lock is held only for the map lookup/mutation; the actual
//! message write to the connection happens outside the lock.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use crate::{log_debug, ClientMessage, Error, Result, SinkError};

/// Outbound half of one client connection.
///
/// The transport layer (out of scope here) yields a bidirectional message
/// channel per connection; the gateway only needs the outbound side.
#[async_trait::async_trait]
pub trait ClientSink: Send + Sync {
    /// Write one message to the client.
    async fn send(&self, msg: ClientMessage) -> std::result::Result<(), SinkError>;
}

/// Shared sink pointer.
pub type SinkPtr = Arc<dyn ClientSink>;

/// Bounded-channel sink decoupling the consumer loop from the transport
/// write.
///
/// A per-connection writer task drains the receiver into the real
/// transport; the consumer loop only performs a `try_send`, so one slow
/// client never blocks delivery to everyone else. A full buffer surfaces as
/// [`SinkError::Busy`] (message dropped, connection kept); a closed channel
/// surfaces as [`SinkError::Closed`] (entry evicted by the caller).
pub struct ChannelSink {
    // ---
    tx: mpsc::Sender<ClientMessage>,
}

impl ChannelSink {
    /// Create a sink and the receiving end the connection writer drains.
    pub fn new(capacity: usize) -> (Arc<Self>, mpsc::Receiver<ClientMessage>) {
        // ---
        let (tx, rx) = mpsc::channel(capacity);
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait::async_trait]
impl ClientSink for ChannelSink {
    async fn send(&self, msg: ClientMessage) -> std::result::Result<(), SinkError> {
        // ---
        self.tx.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Busy,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

/// Concurrency-safe map from owner id to the live connection sink.
///
/// Purely a routing table: no business state, lifetime = process lifetime,
/// entries pruned on disconnect. At most one connection per owner id is
/// authoritative at a time; a new registration for the same owner
/// supersedes the old one.
pub struct ConnectionRegistry {
    // ---
    connections: RwLock<HashMap<String, SinkPtr>>,
}

impl ConnectionRegistry {
    pub fn new() -> Arc<Self> {
        // ---
        Arc::new(Self {
            connections: RwLock::new(HashMap::new()),
        })
    }

    /// Install or overwrite the sink for `owner_id`.
    pub async fn register(&self, owner_id: impl Into<String>, sink: SinkPtr) {
        // ---
        let owner_id = owner_id.into();
        log_debug!("registry: register {owner_id}");

        let mut connections = self.connections.write().await;
        connections.insert(owner_id, sink);
    }

    /// Delete the entry if present; removing an absent entry is a no-op.
    pub async fn remove(&self, owner_id: &str) {
        // ---
        log_debug!("registry: remove {owner_id}");

        let mut connections = self.connections.write().await;
        connections.remove(owner_id);
    }

    /// Write `msg` to the owner's connection.
    ///
    /// Fails with [`Error::NotConnected`] when no sink is registered, or
    /// with [`Error::Delivery`] when the write itself fails; the caller
    /// decides whether to evict the stale entry.
    pub async fn send(&self, owner_id: &str, msg: ClientMessage) -> Result<()> {
        // ---
        let sink = {
            let connections = self.connections.read().await;
            connections.get(owner_id).cloned()
        };

        let sink = sink.ok_or_else(|| Error::NotConnected(owner_id.to_string()))?;

        // Write outside the lock.
        sink.send(msg).await.map_err(Error::from)
    }

    /// Number of live connections, for logs and tests.
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}
