// src/consumers/payment.rs

//! Payment-service consumer: opens a checkout session once a trip has a
//! driver.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::contracts::{keys, queues, TripDetails};
use crate::{
    // ---
    log_debug,
    log_warn,
    BusPtr,
    Delivery,
    EventEnvelope,
    EventPublisher,
    PaymentService,
    QueueBinding,
    Result,
};

/// Consumes trip lifecycle events for the payment service.
pub struct TripEventConsumer {
    // ---
    bus: BusPtr,
    publisher: EventPublisher,
    payments: Arc<dyn PaymentService>,
}

impl TripEventConsumer {
    pub fn new(bus: BusPtr, publisher: EventPublisher, payments: Arc<dyn PaymentService>) -> Self {
        // ---
        Self {
            bus,
            publisher,
            payments,
        }
    }

    /// Bind the inbox queue and spawn the dispatch loop.
    pub async fn start(self) -> Result<JoinHandle<()>> {
        // ---
        let binding = QueueBinding::new(
            queues::PAYMENT_TRIP_EVENTS,
            &[keys::TRIP_EVENT_DRIVER_ASSIGNED],
        );
        let mut handle = self.bus.subscribe(binding).await?;

        Ok(tokio::spawn(async move {
            while let Some(delivery) = handle.inbox.recv().await {
                self.process(delivery).await;
            }
            log_debug!("payment trip-event consumer stopped");
        }))
    }

    async fn process(&self, delivery: Delivery) {
        // ---
        let envelope = match EventEnvelope::decode(&delivery.body) {
            Ok(env) => env,
            Err(_err) => {
                log_warn!("payment consumer: failed to decode envelope: {_err}");
                return;
            }
        };

        if envelope.kind != keys::TRIP_EVENT_DRIVER_ASSIGNED {
            log_debug!("payment consumer: ignoring {}", envelope.kind);
            return;
        }

        if let Err(_err) = self.on_driver_assigned(&envelope).await {
            log_warn!(
                "payment consumer: {} handler failed: {_err}",
                envelope.kind
            );
        }
    }

    /// Open a session for the assigned trip and notify the rider.
    async fn on_driver_assigned(&self, envelope: &EventEnvelope) -> Result<()> {
        // ---
        let trip: TripDetails = envelope.payload()?;
        let session = self.payments.create_session(&trip).await?;

        log_debug!(
            "payment session {} created for trip {}",
            session.session_id,
            session.trip_id
        );
        self.publisher
            .publish_json(
                keys::PAYMENT_EVENT_SESSION_CREATED,
                &session.rider_id,
                &session,
            )
            .await
    }
}
