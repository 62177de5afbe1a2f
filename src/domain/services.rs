// src/domain/services.rs

//! Service capabilities the event consumers and RPC handlers call into.
//!
//! The fabric treats each domain service as an external collaborator behind
//! a narrow method-call contract; the state machines behind these traits
//! (trip records, driver pools, payment ledgers) are owned entirely by the
//! implementing service. Handlers are expected to be idempotent by design —
//! the fabric delivers at-most-once to clients and makes no cross-service
//! transaction guarantees.

use std::collections::HashMap;

use crate::contracts::{
    // ---
    DriverAssignment,
    DriverProfile,
    PaymentSession,
    TripDetails,
    TripPreview,
    TripPreviewRequest,
    TripStartRequest,
};
use crate::Result;

/// Trip lifecycle capability.
#[async_trait::async_trait]
pub trait TripService: Send + Sync {
    /// Fare/ETA estimate without creating a trip.
    async fn preview_trip(&self, req: &TripPreviewRequest) -> Result<TripPreview>;

    /// Create a trip record; the caller publishes `trip.event.created`.
    async fn start_trip(&self, req: &TripStartRequest) -> Result<TripDetails>;

    /// Attach a confirmed driver to the trip.
    async fn assign_driver(&self, trip_id: &str, driver: &DriverProfile) -> Result<TripDetails>;

    /// Record that no driver could be found.
    async fn mark_no_drivers_found(&self, trip_id: &str) -> Result<()>;

    /// Record the payment settlement outcome.
    async fn record_payment(&self, trip_id: &str, settled: bool) -> Result<()>;
}

/// Driver matching capability.
#[async_trait::async_trait]
pub trait DriverService: Send + Sync {
    /// Bring a driver online, making them eligible for trip requests.
    async fn register_driver(&self, driver: DriverProfile) -> Result<()>;

    /// Pick a candidate driver for the trip, remembering the offer so a
    /// later accept/decline can be resolved.
    async fn find_available_driver(&self, trip: &TripDetails) -> Result<Option<DriverProfile>>;

    /// Driver accepted the offered trip.
    async fn accept_trip(&self, driver_id: &str, trip_id: &str) -> Result<DriverAssignment>;

    /// Driver declined; returns the trip so the caller can report back.
    async fn decline_trip(&self, driver_id: &str, trip_id: &str) -> Result<TripDetails>;
}

/// Payment session capability.
#[async_trait::async_trait]
pub trait PaymentService: Send + Sync {
    /// Create a payment session for an assigned trip.
    async fn create_session(&self, trip: &TripDetails) -> Result<PaymentSession>;
}

/// External payment processor (Stripe-shaped).
///
/// In development and test environments this is satisfied by
/// [`MockPaymentProcessor`](crate::MockPaymentProcessor).
#[async_trait::async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Open a checkout session; returns the processor's session id.
    async fn create_payment_session(
        &self,
        amount: u64,
        currency: &str,
        metadata: HashMap<String, String>,
    ) -> Result<String>;
}
