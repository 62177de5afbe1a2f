// src/domain/mod.rs

//! Domain-facing abstractions: the message bus seam and the service
//! capability traits, plus in-memory reference implementations.

mod bus;
mod memory;
mod services;

pub use bus::{BusPtr, Delivery, MessageBus, QueueBinding, QueueName, RoutingKey, SubscriptionHandle};
pub use memory::{
    CheckoutService, InMemoryDriverService, InMemoryTripService, MockPaymentProcessor,
};
pub use services::{DriverService, PaymentProcessor, PaymentService, TripService};
