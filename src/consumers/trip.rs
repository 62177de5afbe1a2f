// src/consumers/trip.rs

//! Trip-service consumers: driver assignment outcomes and payment
//! settlement.
//!
//! Two inbox queues, two consumer tasks. Assignment outcomes advance the
//! trip record and are re-announced under the trip's own routing keys so the
//! rider-facing queues and the payment service can react; settlement events
//! only update the record.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::contracts::{keys, queues, DriverAssignment, PaymentStatus, TripRef};
use crate::{
    // ---
    log_debug,
    log_warn,
    BusPtr,
    Delivery,
    EventEnvelope,
    EventPublisher,
    QueueBinding,
    Result,
    TripService,
};

/// Consumes driver assignment outcomes for the trip service.
pub struct DriverEventConsumer {
    // ---
    bus: BusPtr,
    publisher: EventPublisher,
    trips: Arc<dyn TripService>,
}

impl DriverEventConsumer {
    pub fn new(bus: BusPtr, publisher: EventPublisher, trips: Arc<dyn TripService>) -> Self {
        // ---
        Self {
            bus,
            publisher,
            trips,
        }
    }

    /// Bind the inbox queue and spawn the dispatch loop.
    pub async fn start(self) -> Result<JoinHandle<()>> {
        // ---
        let binding = QueueBinding::new(
            queues::TRIP_DRIVER_EVENTS,
            &[keys::DRIVER_EVENT_ASSIGNED, keys::DRIVER_EVENT_NOT_FOUND],
        );
        let mut handle = self.bus.subscribe(binding).await?;

        Ok(tokio::spawn(async move {
            while let Some(delivery) = handle.inbox.recv().await {
                self.process(delivery).await;
            }
            log_debug!("trip driver-event consumer stopped");
        }))
    }

    async fn process(&self, delivery: Delivery) {
        // ---
        let envelope = match EventEnvelope::decode(&delivery.body) {
            Ok(env) => env,
            Err(_err) => {
                log_warn!("trip consumer: failed to decode envelope: {_err}");
                return;
            }
        };

        let outcome = match envelope.kind.as_str() {
            keys::DRIVER_EVENT_ASSIGNED => self.on_driver_assigned(&envelope).await,
            keys::DRIVER_EVENT_NOT_FOUND => self.on_driver_not_found(&envelope).await,
            _other => {
                log_debug!("trip consumer: ignoring {_other}");
                Ok(())
            }
        };

        if let Err(_err) = outcome {
            log_warn!("trip consumer: {} handler failed: {_err}", envelope.kind);
        }
    }

    /// Attach the driver and announce the assignment on the trip's keys.
    async fn on_driver_assigned(&self, envelope: &EventEnvelope) -> Result<()> {
        // ---
        let assignment: DriverAssignment = envelope.payload()?;
        let trip = self
            .trips
            .assign_driver(&assignment.trip_id, &assignment.driver)
            .await?;

        log_debug!(
            "trip {} assigned to driver {}",
            trip.id,
            assignment.driver.id
        );
        self.publisher
            .publish_json(keys::TRIP_EVENT_DRIVER_ASSIGNED, &trip.rider_id, &trip)
            .await
    }

    async fn on_driver_not_found(&self, envelope: &EventEnvelope) -> Result<()> {
        // ---
        let not_found: TripRef = envelope.payload()?;
        self.trips.mark_no_drivers_found(&not_found.trip_id).await?;

        // The owner of the driver-side event is the rider awaiting a match.
        self.publisher
            .publish_json(
                keys::TRIP_EVENT_NO_DRIVERS_FOUND,
                &envelope.owner_id,
                &not_found,
            )
            .await
    }
}

/// Consumes payment settlement events for the trip service.
pub struct PaymentEventConsumer {
    // ---
    bus: BusPtr,
    trips: Arc<dyn TripService>,
}

impl PaymentEventConsumer {
    pub fn new(bus: BusPtr, trips: Arc<dyn TripService>) -> Self {
        Self { bus, trips }
    }

    /// Bind the inbox queue and spawn the dispatch loop.
    pub async fn start(self) -> Result<JoinHandle<()>> {
        // ---
        let binding = QueueBinding::new(
            queues::TRIP_PAYMENT_EVENTS,
            &[keys::PAYMENT_EVENT_SUCCESS, keys::PAYMENT_EVENT_FAILED],
        );
        let mut handle = self.bus.subscribe(binding).await?;

        Ok(tokio::spawn(async move {
            while let Some(delivery) = handle.inbox.recv().await {
                self.process(delivery).await;
            }
            log_debug!("trip payment-event consumer stopped");
        }))
    }

    async fn process(&self, delivery: Delivery) {
        // ---
        let envelope = match EventEnvelope::decode(&delivery.body) {
            Ok(env) => env,
            Err(_err) => {
                log_warn!("trip payment consumer: failed to decode envelope: {_err}");
                return;
            }
        };

        let settled = match envelope.kind.as_str() {
            keys::PAYMENT_EVENT_SUCCESS => true,
            keys::PAYMENT_EVENT_FAILED => false,
            _other => {
                log_debug!("trip payment consumer: ignoring {_other}");
                return;
            }
        };

        let outcome = async {
            let status: PaymentStatus = envelope.payload()?;
            self.trips.record_payment(&status.trip_id, settled).await
        }
        .await;

        if let Err(_err) = outcome {
            log_warn!(
                "trip payment consumer: {} handler failed: {_err}",
                envelope.kind
            );
        }
    }
}
