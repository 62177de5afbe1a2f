// src/transport/amqp.rs

//! AMQP message bus backed by `lapin`.
//!
//! Implements the [`MessageBus`] trait over one broker connection with a
//! single multiplexed channel, following an **actor-based concurrency
//! model**:
//!
//! - A background actor task owns the AMQP connection and channel.
//! - The actor publishes outbound messages, declares the topic exchange,
//!   declares and binds queues, starts consumers, and performs the clean
//!   shutdown of the connection.
//! - All interaction with the AMQP client is serialized through this actor;
//!   no other task ever touches the connection directly.
//!
//! ## Topology
//!
//! All traffic flows through one topic exchange ([`EXCHANGE`]). Queues are
//! bound with exact routing keys (no wildcards, matching the in-memory
//! reference semantics) and declared non-durable/auto-delete: the fabric is
//! best-effort, and clients re-sync state on reconnect.
//!
//! ## Acknowledgment policy
//!
//! Consumers are started with `no_ack` — a message is considered handled
//! the moment the broker hands it over, before delivery to any client
//! succeeds. A dropped client delivery is therefore not redelivered. This
//! trades at-least-once client delivery for simplicity and is part of the
//! fabric's documented contract, not an oversight.

use lapin::{
    //
    options::{
        //
        BasicConsumeOptions,
        BasicPublishOptions,
        ExchangeDeclareOptions,
        QueueBindOptions,
        QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties,
    Channel,
    Connection,
    ConnectionProperties,
    ExchangeKind,
};

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;

use crate::{
    // ---
    log_debug,
    log_error,
    log_info,
    BusPtr,
    Delivery,
    Error,
    MessageBus,
    QueueBinding,
    Result,
    RoutingKey,
    SubscriptionHandle,
};

/// Topic exchange every routing key is published through.
pub const EXCHANGE: &str = "rideshare.events";

type SubscriberMap = Arc<RwLock<HashMap<String, Vec<mpsc::Sender<Delivery>>>>>;

//
// Actor commands
//

enum Cmd {
    //
    Publish {
        key: RoutingKey,
        body: Bytes,
        resp: oneshot::Sender<Result<()>>,
    },
    Subscribe {
        binding: QueueBinding,
        resp: oneshot::Sender<Result<()>>,
    },
    Close {
        resp: oneshot::Sender<Result<()>>,
    },
}

/// AMQP bus handle.
///
/// Cheap to clone through [`BusPtr`]; all clones talk to the same actor.
pub struct AmqpBus {
    // ---
    bus_id: String,
    cmd_tx: mpsc::Sender<Cmd>,
    subscribers: SubscriberMap,
    actor_handle: RwLock<Option<JoinHandle<()>>>,
}

impl AmqpBus {
    /// Wrap an established connection and channel, spawning the actor task.
    fn create(bus_id: &str, connection: Connection, channel: Channel) -> BusPtr {
        // ---
        let bus_id = bus_id.to_string();

        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let subscribers: SubscriberMap = Arc::new(RwLock::new(HashMap::new()));

        let actor = Actor {
            bus_id: bus_id.clone(),
            connection,
            channel,
            cmd_rx,
            subscribers: Arc::clone(&subscribers),
            exchange_declared: false,
            consumer_handles: HashMap::new(),
        };

        let handle = tokio::spawn(async move {
            actor.run().await;
        });

        Arc::new(Self {
            bus_id,
            cmd_tx,
            subscribers,
            actor_handle: RwLock::new(Some(handle)),
        })
    }
}

/// Background actor task that owns the AMQP connection and channel.
struct Actor {
    // ---
    bus_id: String,
    connection: Connection,
    channel: Channel,
    cmd_rx: mpsc::Receiver<Cmd>,
    subscribers: SubscriberMap,
    exchange_declared: bool,
    consumer_handles: HashMap<String, JoinHandle<()>>,
}

impl Actor {
    async fn run(mut self) {
        // ---
        log_info!("[{}] AMQP actor started", self.bus_id);

        while let Some(cmd) = self.cmd_rx.recv().await {
            self.handle_cmd(cmd).await;
        }

        // Clean up consumer tasks
        for (_, handle) in self.consumer_handles.drain() {
            handle.abort();
        }

        // Close channel and connection exactly once, on the way out.
        let _ = self.channel.close(200, "Normal shutdown").await;
        let _ = self.connection.close(200, "Normal shutdown").await;

        log_info!("[{}] AMQP actor stopped", self.bus_id);
    }

    async fn handle_cmd(&mut self, cmd: Cmd) {
        // ---
        match cmd {
            Cmd::Publish { key, body, resp } => {
                let result = self.do_publish(key, body).await;
                let _ = resp.send(result);
            }
            Cmd::Subscribe { binding, resp } => {
                let result = self.do_subscribe(binding).await;
                let _ = resp.send(result);
            }
            Cmd::Close { resp } => {
                let _ = resp.send(Ok(()));
                self.cmd_rx.close();
            }
        }
    }

    async fn ensure_exchange(&mut self) -> Result<()> {
        // ---
        if self.exchange_declared {
            return Ok(());
        }

        self.channel
            .exchange_declare(
                EXCHANGE,
                ExchangeKind::Topic,
                ExchangeDeclareOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| Error::Transport(format!("amqp: exchange declare failed: {e}")))?;

        self.exchange_declared = true;
        Ok(())
    }

    async fn do_publish(&mut self, key: RoutingKey, body: Bytes) -> Result<()> {
        // ---
        self.ensure_exchange().await?;

        self.channel
            .basic_publish(
                EXCHANGE,
                key.as_str(),
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default(),
            )
            .await
            .map_err(|e| Error::Transport(format!("amqp: publish failed: {e}")))?;

        log_debug!("[{}] Published {}", self.bus_id, key.as_str());
        Ok(())
    }

    async fn do_subscribe(&mut self, binding: QueueBinding) -> Result<()> {
        // ---
        self.ensure_exchange().await?;

        let queue = binding.queue.as_str().to_string();

        let queue_opts = QueueDeclareOptions {
            passive: false,
            durable: false,
            exclusive: false,
            auto_delete: true,
            nowait: false,
        };

        self.channel
            .queue_declare(&queue, queue_opts, FieldTable::default())
            .await
            .map_err(|e| Error::Transport(format!("amqp: queue declare failed: {e}")))?;

        for key in &binding.keys {
            self.channel
                .queue_bind(
                    &queue,
                    EXCHANGE,
                    key.as_str(),
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|e| Error::Transport(format!("amqp: queue bind failed: {e}")))?;
        }

        log_info!(
            "[{}] Declared queue {queue} with {} bindings",
            self.bus_id,
            binding.keys.len()
        );

        // One consumer task per queue; repeat subscriptions only add a
        // local inbox.
        if self.consumer_handles.contains_key(&queue) {
            log_debug!("[{}] Already consuming queue: {queue}", self.bus_id);
            return Ok(());
        }

        // Auto-acknowledge on receipt; see module docs.
        let consume_opts = BasicConsumeOptions {
            no_ack: true,
            ..BasicConsumeOptions::default()
        };

        let consumer = self
            .channel
            .basic_consume(
                &queue,
                &format!("{}-consumer", self.bus_id),
                consume_opts,
                FieldTable::default(),
            )
            .await
            .map_err(|e| Error::Transport(format!("amqp: consume failed: {e}")))?;

        log_info!("[{}] Started consuming queue: {queue}", self.bus_id);

        // Spawn consumer task
        let queue_clone = queue.clone();
        let bus_id = self.bus_id.clone();
        let subscribers = Arc::clone(&self.subscribers);

        let handle = tokio::spawn(async move {
            use futures_lite::stream::StreamExt;

            let mut consumer = consumer;
            while let Some(delivery_result) = consumer.next().await {
                match delivery_result {
                    Ok(delivery) => {
                        log_debug!("[{bus_id}] Received message on queue: {queue_clone}");

                        let delivery = Delivery {
                            routing_key: RoutingKey::from(delivery.routing_key.as_str()),
                            body: Bytes::from(delivery.data),
                        };

                        // Fanout to local subscribers
                        let subs = subscribers.read().await;
                        if let Some(senders) = subs.get(&queue_clone) {
                            for sender in senders {
                                if let Err(e) = sender.send(delivery.clone()).await {
                                    log_error!("[{bus_id}] Failed to send to subscriber: {e}");
                                }
                            }
                        }
                    }
                    Err(e) => {
                        log_error!("[{bus_id}] Consumer error on {queue_clone}: {e}");
                        break;
                    }
                }
            }

            log_info!("[{bus_id}] Consumer task ended for queue: {queue_clone}");
        });

        self.consumer_handles.insert(queue, handle);

        Ok(())
    }
}

#[async_trait::async_trait]
impl MessageBus for AmqpBus {
    // ---
    fn bus_id(&self) -> &str {
        &self.bus_id
    }

    async fn publish(&self, key: RoutingKey, body: Bytes) -> Result<()> {
        // ---
        let (tx, rx) = oneshot::channel();

        self.cmd_tx
            .send(Cmd::Publish {
                key,
                body,
                resp: tx,
            })
            .await
            .map_err(|e| Error::Transport(format!("actor command channel closed: {e}")))?;

        rx.await
            .map_err(|e| Error::Transport(format!("actor responder channel read failed: {e}")))?
    }

    async fn subscribe(&self, binding: QueueBinding) -> Result<SubscriptionHandle> {
        // ---
        let queue = binding.queue.as_str().to_string();

        // The inbox goes into the map before the broker round-trip so a
        // message arriving right after the bind confirmation cannot slip
        // past it; if the declare/bind fails the entry is rolled back.
        let (tx, rx) = mpsc::channel(64);
        {
            let mut map = self.subscribers.write().await;
            map.entry(queue.clone()).or_default().push(tx.clone());
        }

        let confirmed = async {
            let (resp_tx, resp_rx) = oneshot::channel();

            self.cmd_tx
                .send(Cmd::Subscribe {
                    binding,
                    resp: resp_tx,
                })
                .await
                .map_err(|e| Error::Transport(format!("actor command channel closed: {e}")))?;

            resp_rx
                .await
                .map_err(|e| Error::Transport(format!("actor resp_rx channel read failed: {e}")))?
        }
        .await;

        if let Err(err) = confirmed {
            remove_subscriber(&self.subscribers, &queue, &tx).await;
            return Err(err);
        }

        Ok(SubscriptionHandle { inbox: rx })
    }

    async fn close(&self) -> Result<()> {
        // ---
        let (tx, rx) = oneshot::channel();

        // A closed command channel means the actor already shut down;
        // close() stays idempotent.
        let _ = self.cmd_tx.send(Cmd::Close { resp: tx }).await;
        let _ = rx.await;

        if let Some(handle) = self.actor_handle.write().await.take() {
            let _ = handle.await;
        }

        Ok(())
    }
}

/// Drop one inbox sender from the subscriber map, removing the queue entry
/// when it was the last. Used to roll back a subscription whose broker-side
/// declare or bind did not go through.
async fn remove_subscriber(
    subscribers: &SubscriberMap,
    queue: &str,
    tx: &mpsc::Sender<Delivery>,
) {
    // ---
    let mut map = subscribers.write().await;
    if let Some(senders) = map.get_mut(queue) {
        senders.retain(|s| !s.same_channel(tx));
        if senders.is_empty() {
            map.remove(queue);
        }
    }
}

/// Single connect attempt against the broker: connection plus one channel,
/// wrapped as a [`BusPtr`].
///
/// Callers that must survive broker startup races wrap this in
/// [`connect_with_retry`](crate::connect_with_retry).
///
/// # Errors
///
/// Returns [`Error::Transport`] when the URI cannot be reached or the
/// channel cannot be created.
pub async fn connect_amqp_bus(bus_id: &str, uri: &str) -> Result<BusPtr> {
    // ---
    let (connection, channel) = create_amqp_connection(uri).await?;
    Ok(AmqpBus::create(bus_id, connection, channel))
}

/// Creates an AMQP connection and channel for the given URI.
async fn create_amqp_connection(uri: &str) -> Result<(Connection, Channel)> {
    // ---
    log_info!("Connecting to AMQP broker: {uri}");

    let connection = Connection::connect(uri, ConnectionProperties::default())
        .await
        .map_err(|e| {
            let msg = format!("amqp: connection failed: {e}");
            log_error!("{msg}");
            Error::Transport(msg)
        })?;

    log_info!("Connected to AMQP broker");

    let channel = connection.create_channel().await.map_err(|e| {
        let msg = format!("amqp: channel creation failed: {e}");
        log_error!("{msg}");
        Error::Transport(msg)
    })?;

    log_info!("Created AMQP channel");

    Ok((connection, channel))
}
