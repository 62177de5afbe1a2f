// src/consumers/driver.rs

//! Driver-service consumer: trip creation and driver responses.
//!
//! Reacts to `trip.event.created` by offering the trip to an available
//! driver, and to the driver's accept/decline commands (forwarded by the
//! gateway on the driver's behalf) by confirming the assignment or moving on
//! to the next candidate.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::contracts::{keys, queues, DriverTripResponse, TripDetails, TripRef, TripRequestOffer};
use crate::{
    // ---
    log_debug,
    log_warn,
    BusPtr,
    Delivery,
    DriverService,
    EventEnvelope,
    EventPublisher,
    QueueBinding,
    Result,
};

/// Consumes the driver-service inbox queue.
pub struct TripEventConsumer {
    // ---
    bus: BusPtr,
    publisher: EventPublisher,
    drivers: Arc<dyn DriverService>,
}

impl TripEventConsumer {
    pub fn new(bus: BusPtr, publisher: EventPublisher, drivers: Arc<dyn DriverService>) -> Self {
        // ---
        Self {
            bus,
            publisher,
            drivers,
        }
    }

    /// Bind the inbox queue and spawn the dispatch loop.
    pub async fn start(self) -> Result<JoinHandle<()>> {
        // ---
        let binding = QueueBinding::new(
            queues::DRIVER_TRIP_EVENTS,
            &[
                keys::TRIP_EVENT_CREATED,
                keys::DRIVER_CMD_TRIP_ACCEPT,
                keys::DRIVER_CMD_TRIP_DECLINE,
            ],
        );
        let mut handle = self.bus.subscribe(binding).await?;

        Ok(tokio::spawn(async move {
            while let Some(delivery) = handle.inbox.recv().await {
                self.process(delivery).await;
            }
            log_debug!("driver trip-event consumer stopped");
        }))
    }

    async fn process(&self, delivery: Delivery) {
        // ---
        let envelope = match EventEnvelope::decode(&delivery.body) {
            Ok(env) => env,
            Err(_err) => {
                log_warn!("driver consumer: failed to decode envelope: {_err}");
                return;
            }
        };

        let outcome = match envelope.kind.as_str() {
            keys::TRIP_EVENT_CREATED => self.on_trip_created(&envelope).await,
            keys::DRIVER_CMD_TRIP_ACCEPT => self.on_trip_accepted(&envelope).await,
            keys::DRIVER_CMD_TRIP_DECLINE => self.on_trip_declined(&envelope).await,
            _other => {
                log_debug!("driver consumer: ignoring {_other}");
                Ok(())
            }
        };

        if let Err(_err) = outcome {
            log_warn!("driver consumer: {} handler failed: {_err}", envelope.kind);
        }
    }

    /// Offer the new trip to a driver, or report that none is available.
    async fn on_trip_created(&self, envelope: &EventEnvelope) -> Result<()> {
        // ---
        let trip: TripDetails = envelope.payload()?;
        self.offer_trip(trip).await
    }

    async fn offer_trip(&self, trip: TripDetails) -> Result<()> {
        // ---
        match self.drivers.find_available_driver(&trip).await? {
            Some(driver) => {
                log_debug!("offering trip {} to driver {}", trip.id, driver.id);
                let offer = TripRequestOffer {
                    trip,
                    driver: driver.clone(),
                };
                self.publisher
                    .publish_json(keys::DRIVER_CMD_TRIP_REQUEST, &driver.id, &offer)
                    .await
            }
            None => {
                log_debug!("no driver available for trip {}", trip.id);
                let not_found = TripRef {
                    trip_id: trip.id.clone(),
                };
                self.publisher
                    .publish_json(keys::DRIVER_EVENT_NOT_FOUND, &trip.rider_id, &not_found)
                    .await
            }
        }
    }

    /// The envelope owner is the accepting driver.
    async fn on_trip_accepted(&self, envelope: &EventEnvelope) -> Result<()> {
        // ---
        let response: DriverTripResponse = envelope.payload()?;
        let assignment = self
            .drivers
            .accept_trip(&envelope.owner_id, &response.trip_id)
            .await?;

        self.publisher
            .publish_json(keys::DRIVER_EVENT_ASSIGNED, &assignment.rider_id, &assignment)
            .await
    }

    /// A decline re-enters the matching loop with the next candidate.
    async fn on_trip_declined(&self, envelope: &EventEnvelope) -> Result<()> {
        // ---
        let response: DriverTripResponse = envelope.payload()?;
        let trip = self
            .drivers
            .decline_trip(&envelope.owner_id, &response.trip_id)
            .await?;

        self.offer_trip(trip).await
    }
}
