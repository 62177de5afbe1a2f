// src/consumers/mod.rs

//! Per-service domain event consumers.
//!
//! Each backend service runs one consumer task per inbox queue; the consumer
//! decodes envelopes, dispatches on `kind`, calls into the owning service's
//! capability trait, and publishes follow-up events. The trip lifecycle is
//! coordinated purely through these reactions, with no central orchestrator.
//!
//! Shared failure policy, matching the gateway bridge: a malformed envelope,
//! an unexpected payload, or a failing handler is logged and skipped; the
//! delivery loop itself only stops when the bus shuts down.

pub mod driver;
pub mod payment;
pub mod trip;
