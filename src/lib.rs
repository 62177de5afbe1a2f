//! Event-routing backbone for a ride-sharing platform.
//!
//! This library is the messaging fabric shared by the platform's services:
//! the gateway bridging broker events to live client connections, and the
//! trip, driver, and payment services coordinating the trip lifecycle
//! through choreographed domain events. It handles resilient broker
//! bootstrap, per-user fan-out, event publication, per-service consumers,
//! correlated RPC, and graceful shutdown.
//!

// Import all sub modules once...
mod bootstrap;
mod config;
mod domain;

pub mod consumers;
pub mod contracts;
mod error;
mod gateway;
mod publisher;
mod rpc;
mod transport;

mod macros;

pub(crate) use macros::{log_debug, log_error, log_info, log_warn};

// Re-export main types
pub use bootstrap::{connect_with_retry, RetryPolicy, Shutdown};
pub use config::{Config, DEFAULT_BROKER_URI, DEFAULT_TRACING_ENDPOINT};
pub use error::{Error, Result, SinkError};
pub use publisher::EventPublisher;

pub use gateway::{
    //
    forward_client_command,
    ChannelSink,
    ClientSink,
    ConnectionRegistry,
    QueueConsumer,
    SinkPtr,
};

// --- public re-exports
pub use domain::{
    //
    BusPtr,
    CheckoutService,
    Delivery,
    DriverService,
    InMemoryDriverService,
    InMemoryTripService,
    MessageBus,
    MockPaymentProcessor,
    PaymentProcessor,
    PaymentService,
    QueueBinding,
    QueueName,
    RoutingKey,
    SubscriptionHandle,
    TripService,
};

pub use transport::{create_memory_bus, create_memory_bus_with_hub, MemoryHub};

#[cfg(feature = "transport_amqp")]
pub use transport::{connect_amqp_bus, EXCHANGE};

pub use rpc::{
    //
    register_driver_handlers,
    register_payment_handlers,
    register_trip_handlers,
    DriverRpc,
    PaymentRpc,
    RpcClient,
    RpcServer,
    TripRpc,
    DRIVER_SERVICE,
    PAYMENT_SERVICE,
    TRIP_SERVICE,
};

pub use contracts::{
    //
    keys,
    queues,
    reshape_payload,
    ClientMessage,
    EventEnvelope,
    DRIVER_NOTIFICATION_KEYS,
    RIDER_NOTIFICATION_KEYS,
};

/// Create the bus the service binaries run against.
///
/// With the `transport_amqp` feature (the default) this is a single broker
/// connection attempt, intended to be wrapped in
/// [`connect_with_retry`]; without it, the in-memory bus on the
/// process-global hub.
pub async fn create_bus(config: &Config) -> Result<BusPtr> {
    // ---
    #[cfg(feature = "transport_amqp")]
    {
        return connect_amqp_bus(&config.service_name, &config.broker_uri).await;
    }

    #[cfg(not(feature = "transport_amqp"))]
    {
        Ok(create_memory_bus(config.service_name.clone()))
    }
}
