// src/domain/memory.rs

//! In-memory reference implementations of the service capabilities.
//!
//! These back the service binaries in development and the integration
//! tests; a production deployment substitutes real implementations behind
//! the same traits. Deliberately thin — the fabric, not the business logic,
//! is the subject of this crate.

use std::collections::{HashMap, HashSet};

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::contracts::{
    // ---
    Coordinates,
    DriverAssignment,
    DriverProfile,
    PaymentSession,
    TripDetails,
    TripPreview,
    TripPreviewRequest,
    TripStartRequest,
};
use crate::{
    // ---
    DriverService,
    Error,
    PaymentProcessor,
    PaymentService,
    Result,
    TripService,
};

/// Flat per-kilometer fare in minor units, development tariff.
const FARE_PER_KM: f64 = 250.0;
const BASE_FARE: f64 = 300.0;

fn estimate_fare(pickup: &Coordinates, dropoff: &Coordinates) -> (u64, u32) {
    // ---
    // Equirectangular approximation is plenty for a fare estimate.
    let lat_km = (dropoff.latitude - pickup.latitude).abs() * 111.0;
    let lon_km = (dropoff.longitude - pickup.longitude).abs()
        * 111.0
        * pickup.latitude.to_radians().cos().abs();
    let distance_km = (lat_km * lat_km + lon_km * lon_km).sqrt();

    let fare = (BASE_FARE + distance_km * FARE_PER_KM).round() as u64;
    let eta_minutes = (distance_km / 0.5).ceil() as u32 + 2;
    (fare, eta_minutes)
}

#[derive(Default)]
struct TripRecord {
    trip: Option<TripDetails>,
    settled: Option<bool>,
}

/// Trip store keyed by trip id.
#[derive(Default)]
pub struct InMemoryTripService {
    // ---
    trips: Mutex<HashMap<String, TripRecord>>,
}

impl InMemoryTripService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/diagnostic accessor.
    pub async fn trip(&self, trip_id: &str) -> Option<TripDetails> {
        self.trips
            .lock()
            .await
            .get(trip_id)
            .and_then(|r| r.trip.clone())
    }

    /// Settlement outcome recorded for the trip, if any.
    pub async fn settlement(&self, trip_id: &str) -> Option<bool> {
        self.trips.lock().await.get(trip_id).and_then(|r| r.settled)
    }
}

#[async_trait::async_trait]
impl TripService for InMemoryTripService {
    async fn preview_trip(&self, req: &TripPreviewRequest) -> Result<TripPreview> {
        // ---
        let (fare_amount, eta_minutes) = estimate_fare(&req.pickup, &req.dropoff);
        Ok(TripPreview {
            fare_amount,
            currency: "usd".into(),
            eta_minutes,
        })
    }

    async fn start_trip(&self, req: &TripStartRequest) -> Result<TripDetails> {
        // ---
        let (fare_amount, _) = estimate_fare(&req.pickup, &req.dropoff);
        let trip = TripDetails {
            id: Uuid::new_v4().to_string(),
            rider_id: req.rider_id.clone(),
            pickup: req.pickup,
            dropoff: req.dropoff,
            fare_amount,
            currency: "usd".into(),
            driver: None,
        };

        let mut trips = self.trips.lock().await;
        trips.insert(
            trip.id.clone(),
            TripRecord {
                trip: Some(trip.clone()),
                settled: None,
            },
        );
        Ok(trip)
    }

    async fn assign_driver(&self, trip_id: &str, driver: &DriverProfile) -> Result<TripDetails> {
        // ---
        let mut trips = self.trips.lock().await;
        let record = trips
            .get_mut(trip_id)
            .ok_or_else(|| Error::Domain(format!("unknown trip: {trip_id}")))?;
        let trip = record
            .trip
            .as_mut()
            .ok_or_else(|| Error::Domain(format!("trip {trip_id} has no details")))?;

        trip.driver = Some(driver.clone());
        Ok(trip.clone())
    }

    async fn mark_no_drivers_found(&self, trip_id: &str) -> Result<()> {
        // ---
        let mut trips = self.trips.lock().await;
        trips.remove(trip_id);
        Ok(())
    }

    async fn record_payment(&self, trip_id: &str, settled: bool) -> Result<()> {
        // ---
        let mut trips = self.trips.lock().await;
        let record = trips
            .get_mut(trip_id)
            .ok_or_else(|| Error::Domain(format!("unknown trip: {trip_id}")))?;
        record.settled = Some(settled);
        Ok(())
    }
}

/// A trip offer awaiting the driver's accept/decline.
struct PendingOffer {
    trip: TripDetails,
    driver: DriverProfile,
}

/// Driver pool with first-come-first-served matching.
///
/// Drivers who declined a trip are remembered per trip so the matching loop
/// never re-offers the same trip to the same driver.
#[derive(Default)]
pub struct InMemoryDriverService {
    // ---
    available: Mutex<Vec<DriverProfile>>,
    pending: Mutex<HashMap<String, PendingOffer>>,
    declined: Mutex<HashMap<String, HashSet<String>>>,
}

impl InMemoryDriverService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl DriverService for InMemoryDriverService {
    async fn register_driver(&self, driver: DriverProfile) -> Result<()> {
        // ---
        let mut available = self.available.lock().await;
        if !available.iter().any(|d| d.id == driver.id) {
            available.push(driver);
        }
        Ok(())
    }

    async fn find_available_driver(&self, trip: &TripDetails) -> Result<Option<DriverProfile>> {
        // ---
        let declined = self.declined.lock().await;
        let skip = declined.get(&trip.id);

        let mut available = self.available.lock().await;
        let Some(pos) = available
            .iter()
            .position(|d| skip.map_or(true, |s| !s.contains(&d.id)))
        else {
            return Ok(None);
        };
        let driver = available.remove(pos);
        drop(available);
        drop(declined);

        let mut pending = self.pending.lock().await;
        pending.insert(
            trip.id.clone(),
            PendingOffer {
                trip: trip.clone(),
                driver: driver.clone(),
            },
        );
        Ok(Some(driver))
    }

    async fn accept_trip(&self, driver_id: &str, trip_id: &str) -> Result<DriverAssignment> {
        // ---
        let mut pending = self.pending.lock().await;
        let offer = pending
            .remove(trip_id)
            .ok_or_else(|| Error::Domain(format!("no pending offer for trip: {trip_id}")))?;

        if offer.driver.id != driver_id {
            // Offer went to someone else; put it back untouched.
            let rejected = format!(
                "trip {trip_id} was offered to {}, not {driver_id}",
                offer.driver.id
            );
            pending.insert(trip_id.to_string(), offer);
            return Err(Error::Domain(rejected));
        }

        drop(pending);
        self.declined.lock().await.remove(trip_id);

        Ok(DriverAssignment {
            trip_id: offer.trip.id,
            rider_id: offer.trip.rider_id,
            driver: offer.driver,
        })
    }

    async fn decline_trip(&self, driver_id: &str, trip_id: &str) -> Result<TripDetails> {
        // ---
        let mut pending = self.pending.lock().await;
        let offer = pending
            .remove(trip_id)
            .ok_or_else(|| Error::Domain(format!("no pending offer for trip: {trip_id}")))?;

        // The declining driver goes back in the pool but is excluded from
        // further offers for this trip.
        if offer.driver.id == driver_id {
            let mut declined = self.declined.lock().await;
            declined
                .entry(trip_id.to_string())
                .or_default()
                .insert(offer.driver.id.clone());
            let mut available = self.available.lock().await;
            available.push(offer.driver);
        }

        Ok(offer.trip)
    }
}

/// Payment sessions built on an external [`PaymentProcessor`].
pub struct CheckoutService<P> {
    // ---
    processor: P,
}

impl<P: PaymentProcessor> CheckoutService<P> {
    pub fn new(processor: P) -> Self {
        Self { processor }
    }
}

#[async_trait::async_trait]
impl<P: PaymentProcessor> PaymentService for CheckoutService<P> {
    async fn create_session(&self, trip: &TripDetails) -> Result<PaymentSession> {
        // ---
        let mut metadata = HashMap::new();
        metadata.insert("tripId".to_string(), trip.id.clone());
        metadata.insert("riderId".to_string(), trip.rider_id.clone());

        let session_id = self
            .processor
            .create_payment_session(trip.fare_amount, &trip.currency, metadata)
            .await?;

        Ok(PaymentSession {
            session_id,
            trip_id: trip.id.clone(),
            rider_id: trip.rider_id.clone(),
            amount: trip.fare_amount,
            currency: trip.currency.clone(),
        })
    }
}

/// Mock payment processor for environments without real processor
/// credentials; returns a synthetically generated session identifier.
#[derive(Default)]
pub struct MockPaymentProcessor;

impl MockPaymentProcessor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl PaymentProcessor for MockPaymentProcessor {
    async fn create_payment_session(
        &self,
        _amount: u64,
        _currency: &str,
        _metadata: HashMap<String, String>,
    ) -> Result<String> {
        // ---
        Ok(format!("mock_session_{}", Uuid::new_v4()))
    }
}
