// src/transport/mod.rs

//! Concrete [`MessageBus`](crate::MessageBus) implementations.
//!
//! - [`memory`] — in-process hub, always available; defines the reference
//!   bus semantics and backs the test suites.
//! - [`amqp`] — lapin-backed broker bus, behind the `transport_amqp`
//!   feature; what the service binaries run against.

mod memory;

#[cfg(feature = "transport_amqp")]
mod amqp;

pub use memory::{create_memory_bus, create_memory_bus_with_hub, MemoryHub};

#[cfg(feature = "transport_amqp")]
pub use amqp::{connect_amqp_bus, EXCHANGE};
