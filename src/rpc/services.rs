// src/rpc/services.rs

//! Typed RPC surfaces for the platform services.
//!
//! The facades wrap [`RpcClient::call`] with concrete request/response
//! documents; the `register_*_handlers` functions bind a service's
//! capability trait onto an [`RpcServer`]'s method table. Method names are
//! private coupling between the two halves of this module.

use std::sync::Arc;

use super::{RpcClient, RpcServer};
use crate::contracts::{
    // ---
    keys,
    DriverProfile,
    PaymentSession,
    TripDetails,
    TripPreview,
    TripPreviewRequest,
    TripStartRequest,
};
use crate::{DriverService, EventPublisher, PaymentService, Result, TripService};

/// Node id of the trip service (request queue `rpc.trip-service.requests`).
pub const TRIP_SERVICE: &str = "trip-service";
/// Node id of the driver service.
pub const DRIVER_SERVICE: &str = "driver-service";
/// Node id of the payment service.
pub const PAYMENT_SERVICE: &str = "payment-service";

const METHOD_TRIP_PREVIEW: &str = "trip.preview";
const METHOD_TRIP_START: &str = "trip.start";
const METHOD_DRIVER_REGISTER: &str = "driver.register";
const METHOD_PAYMENT_SESSION: &str = "payment.create_session";

/// Client surface of the trip service.
#[derive(Clone)]
pub struct TripRpc {
    // ---
    client: Arc<RpcClient>,
}

impl TripRpc {
    pub fn new(client: Arc<RpcClient>) -> Self {
        Self { client }
    }

    /// Fare/ETA estimate without creating a trip.
    pub async fn preview(&self, req: &TripPreviewRequest) -> Result<TripPreview> {
        self.client
            .call(TRIP_SERVICE, METHOD_TRIP_PREVIEW, req)
            .await
    }

    /// Create a trip; the service publishes `trip.event.created` before
    /// responding, so the choreography is already moving when this returns.
    pub async fn start(&self, req: &TripStartRequest) -> Result<TripDetails> {
        self.client.call(TRIP_SERVICE, METHOD_TRIP_START, req).await
    }
}

/// Client surface of the driver service.
#[derive(Clone)]
pub struct DriverRpc {
    // ---
    client: Arc<RpcClient>,
}

impl DriverRpc {
    pub fn new(client: Arc<RpcClient>) -> Self {
        Self { client }
    }

    /// Bring a driver online.
    pub async fn register(&self, driver: &DriverProfile) -> Result<DriverProfile> {
        self.client
            .call(DRIVER_SERVICE, METHOD_DRIVER_REGISTER, driver)
            .await
    }
}

/// Client surface of the payment service.
#[derive(Clone)]
pub struct PaymentRpc {
    // ---
    client: Arc<RpcClient>,
}

impl PaymentRpc {
    pub fn new(client: Arc<RpcClient>) -> Self {
        Self { client }
    }

    /// Open a payment session for a trip out of band of the choreography.
    pub async fn create_session(&self, trip: &TripDetails) -> Result<PaymentSession> {
        self.client
            .call(PAYMENT_SERVICE, METHOD_PAYMENT_SESSION, trip)
            .await
    }
}

/// Bind the trip service's capability onto an RPC server.
pub fn register_trip_handlers(
    server: &RpcServer,
    trips: Arc<dyn TripService>,
    publisher: EventPublisher,
) {
    // ---
    let preview_trips = trips.clone();
    server.register(METHOD_TRIP_PREVIEW, move |req: TripPreviewRequest| {
        let trips = preview_trips.clone();
        async move { trips.preview_trip(&req).await }
    });

    server.register(METHOD_TRIP_START, move |req: TripStartRequest| {
        let trips = trips.clone();
        let publisher = publisher.clone();
        async move {
            let trip = trips.start_trip(&req).await?;
            publisher
                .publish_json(keys::TRIP_EVENT_CREATED, &trip.rider_id, &trip)
                .await?;
            Ok(trip)
        }
    });
}

/// Bind the driver service's capability onto an RPC server.
pub fn register_driver_handlers(server: &RpcServer, drivers: Arc<dyn DriverService>) {
    // ---
    server.register(METHOD_DRIVER_REGISTER, move |driver: DriverProfile| {
        let drivers = drivers.clone();
        async move {
            drivers.register_driver(driver.clone()).await?;
            Ok(driver)
        }
    });
}

/// Bind the payment service's capability onto an RPC server.
pub fn register_payment_handlers(server: &RpcServer, payments: Arc<dyn PaymentService>) {
    // ---
    server.register(METHOD_PAYMENT_SESSION, move |trip: TripDetails| {
        let payments = payments.clone();
        async move { payments.create_session(&trip).await }
    });
}
