// src/transport/memory.rs

//! In-memory message bus.
//!
//! A pure in-process implementation of the domain-level [`MessageBus`]
//! trait, intended for testing, local execution, and as the reference for
//! bus semantics.
//!
//! ## Reference semantics
//!
//! - Once `subscribe()` returns successfully, messages published *after*
//!   that point under a bound routing key are deliverable.
//! - Routing-key matching is exact string equality; no wildcards.
//! - Per queue, deliveries preserve publish order.
//! - Fanout: every queue bound to a key receives its own copy; multiple
//!   subscribers on the same queue all receive every delivery.
//!
//! This bus does not attempt to emulate broker failure modes, persistence,
//! or delivery guarantees; it provides a deterministic baseline against
//! which the bridging and choreography layers are validated.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use tokio::sync::{mpsc, RwLock};

use crate::{
    // ---
    log_debug,
    log_info,
    BusPtr,
    Delivery,
    MessageBus,
    QueueBinding,
    Result,
    RoutingKey,
    SubscriptionHandle,
};
use bytes::Bytes;

/// One queue's binding state on the hub.
struct QueueState {
    // ---
    keys: Vec<RoutingKey>,
    senders: Vec<mpsc::Sender<Delivery>>,
}

/// Shared broker state for the in-memory bus.
///
/// Simulates a message broker within a single process. All `MemoryBus`
/// instances that share a hub publish into the same binding table, exactly
/// as processes connected to one real broker would.
///
/// Integration tests that run in parallel should construct a hub explicitly
/// via [`MemoryHub::new`] and pass it to
/// [`create_memory_bus_with_hub`](crate::create_memory_bus_with_hub) for
/// isolation.
pub struct MemoryHub {
    // ---
    queues: RwLock<HashMap<Arc<str>, QueueState>>,
}

impl MemoryHub {
    /// Create a new, empty hub.
    pub fn new() -> Arc<Self> {
        // ---
        Arc::new(Self {
            queues: RwLock::new(HashMap::new()),
        })
    }

    async fn publish(&self, _bus_id: &str, key: RoutingKey, body: Bytes) -> Result<()> {
        // ---
        // Snapshot the matching senders first; the bounded sends below can
        // wait on a full inbox, and that wait must not happen with the
        // binding table locked or one slow queue would stall every other
        // publisher and block new subscriptions.
        let targets: Vec<(Arc<str>, mpsc::Sender<Delivery>)> = {
            let queues = self.queues.read().await;
            queues
                .iter()
                .filter(|(_, state)| state.keys.contains(&key))
                .flat_map(|(queue, state)| {
                    state.senders.iter().map(|tx| (queue.clone(), tx.clone()))
                })
                .collect()
        };

        for (_queue, sender) in targets {
            log_debug!("{_bus_id}: publish {} -> {_queue}", key.as_str());

            let delivery = Delivery {
                routing_key: key.clone(),
                body: body.clone(),
            };
            // A closed channel indicates a dropped SubscriptionHandle.
            if let Err(_err) = sender.send(delivery).await {
                log_info!("{_bus_id}: dropped delivery on {_queue}: {_err}");
            }
        }

        Ok(())
    }

    async fn subscribe(&self, _bus_id: &str, binding: QueueBinding) -> Result<SubscriptionHandle> {
        // ---
        log_debug!(
            "{_bus_id}: subscribe {} ({} keys)",
            binding.queue.as_str(),
            binding.keys.len()
        );

        let (tx, rx) = mpsc::channel(64);

        let mut queues = self.queues.write().await;
        let state = queues
            .entry(binding.queue.0.clone())
            .or_insert_with(|| QueueState {
                keys: Vec::new(),
                senders: Vec::new(),
            });

        for key in binding.keys {
            if !state.keys.contains(&key) {
                state.keys.push(key);
            }
        }
        state.senders.push(tx);

        Ok(SubscriptionHandle { inbox: rx })
    }

    async fn close(&self, _bus_id: &str) -> Result<()> {
        // ---
        log_debug!("{_bus_id}: closing bus...");

        let mut queues = self.queues.write().await;
        queues.clear();
        Ok(())
    }
}

/// Process-global hub used by [`create_memory_bus`](crate::create_memory_bus).
static GLOBAL_HUB: OnceLock<Arc<MemoryHub>> = OnceLock::new();

fn global_hub() -> Arc<MemoryHub> {
    GLOBAL_HUB.get_or_init(MemoryHub::new).clone()
}

/// In-memory bus instance routing through a shared [`MemoryHub`].
struct MemoryBus {
    // ---
    bus_id: String,
    hub: Arc<MemoryHub>,
}

#[async_trait::async_trait]
impl MessageBus for MemoryBus {
    // ---
    fn bus_id(&self) -> &str {
        &self.bus_id
    }

    async fn publish(&self, key: RoutingKey, body: Bytes) -> Result<()> {
        self.hub.publish(&self.bus_id, key, body).await
    }

    async fn subscribe(&self, binding: QueueBinding) -> Result<SubscriptionHandle> {
        self.hub.subscribe(&self.bus_id, binding).await
    }

    /// Clears all bindings from the shared hub. Idempotent. Note that other
    /// bus instances sharing the hub lose their bindings too; use per-test
    /// hubs to avoid this.
    async fn close(&self) -> Result<()> {
        self.hub.close(&self.bus_id).await
    }
}

/// Create an in-memory bus on the process-global hub.
///
/// All buses created with this function share one binding table, matching
/// the semantics of processes connected to a single broker.
pub fn create_memory_bus(bus_id: impl Into<String>) -> BusPtr {
    // ---
    create_memory_bus_with_hub(bus_id, global_hub())
}

/// Create an in-memory bus on an explicitly provided hub.
///
/// Lets parallel tests isolate their binding tables from each other.
pub fn create_memory_bus_with_hub(bus_id: impl Into<String>, hub: Arc<MemoryHub>) -> BusPtr {
    // ---
    let bus_id = bus_id.into();
    log_debug!("{bus_id}: create memory bus");

    Arc::new(MemoryBus { bus_id, hub })
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::time::Duration;

    fn body(text: &str) -> Bytes {
        Bytes::from(text.as_bytes().to_vec())
    }

    async fn recv(handle: &mut SubscriptionHandle) -> Delivery {
        tokio::time::timeout(Duration::from_secs(1), handle.inbox.recv())
            .await
            .expect("timed out waiting for delivery")
            .expect("inbox closed")
    }

    #[tokio::test]
    async fn test_routes_by_bound_key() {
        // ---
        let hub = MemoryHub::new();
        let bus = create_memory_bus_with_hub("test", hub);

        let mut trips = bus
            .subscribe(QueueBinding::new("q.trips", &["trip.event.created"]))
            .await
            .unwrap();
        let mut drivers = bus
            .subscribe(QueueBinding::new("q.drivers", &["driver.cmd.trip_request"]))
            .await
            .unwrap();

        bus.publish("trip.event.created".into(), body("a"))
            .await
            .unwrap();

        let delivery = recv(&mut trips).await;
        assert_eq!(delivery.routing_key.as_str(), "trip.event.created");
        assert_eq!(&delivery.body[..], b"a");

        // The driver queue saw nothing.
        assert!(drivers.inbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_fanout_to_all_bound_queues() {
        // ---
        let hub = MemoryHub::new();
        let bus = create_memory_bus_with_hub("test", hub);

        let mut q1 = bus
            .subscribe(QueueBinding::new("q.one", &["trip.event.created"]))
            .await
            .unwrap();
        let mut q2 = bus
            .subscribe(QueueBinding::new("q.two", &["trip.event.created"]))
            .await
            .unwrap();

        bus.publish("trip.event.created".into(), body("x"))
            .await
            .unwrap();

        assert_eq!(&recv(&mut q1).await.body[..], b"x");
        assert_eq!(&recv(&mut q2).await.body[..], b"x");
    }

    #[tokio::test]
    async fn test_per_queue_order_preserved() {
        // ---
        let hub = MemoryHub::new();
        let bus = create_memory_bus_with_hub("test", hub);

        let mut q = bus
            .subscribe(QueueBinding::new("q.ordered", &["trip.event.created"]))
            .await
            .unwrap();

        for i in 0..5u8 {
            bus.publish("trip.event.created".into(), Bytes::from(vec![i]))
                .await
                .unwrap();
        }

        for i in 0..5u8 {
            assert_eq!(recv(&mut q).await.body[0], i);
        }
    }

    #[tokio::test]
    async fn test_full_inbox_does_not_stall_other_queues() {
        // ---
        let hub = MemoryHub::new();
        let bus = create_memory_bus_with_hub("test", hub);

        let mut stalled = bus
            .subscribe(QueueBinding::new("q.stalled", &["trip.event.created"]))
            .await
            .unwrap();

        // Fill the unread inbox to its channel capacity, then park one more
        // publish behind it.
        for _ in 0..64 {
            bus.publish("trip.event.created".into(), body("x"))
                .await
                .unwrap();
        }
        let parked = {
            let bus = bus.clone();
            tokio::spawn(
                async move { bus.publish("trip.event.created".into(), body("y")).await },
            )
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The parked publish is waiting on the full inbox, but the binding
        // table stays available: new subscriptions and publishes to other
        // queues go through.
        let mut other = tokio::time::timeout(
            Duration::from_secs(1),
            bus.subscribe(QueueBinding::new("q.other", &["driver.cmd.trip_request"])),
        )
        .await
        .expect("subscribe stalled behind a full inbox")
        .unwrap();

        bus.publish("driver.cmd.trip_request".into(), body("z"))
            .await
            .unwrap();
        assert_eq!(&recv(&mut other).await.body[..], b"z");

        // Draining one delivery frees the slot the parked publish needs.
        recv(&mut stalled).await;
        parked.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        // ---
        let hub = MemoryHub::new();
        let bus = create_memory_bus_with_hub("test", hub);

        bus.close().await.unwrap();
        bus.close().await.unwrap();
    }
}
