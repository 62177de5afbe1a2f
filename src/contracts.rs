// src/contracts.rs

//! Wire contracts shared by every service.
//!
//! Two message shapes cross process boundaries:
//!
//! - [`EventEnvelope`] — the unit exchanged over the broker: owner identity,
//!   routing key, opaque structured payload.
//! - [`ClientMessage`] — the unit forwarded over a client connection:
//!   message type (the originating routing key) plus the payload.
//!
//! Routing keys form a dot-separated namespace `<domain>.<cmd|event>.<name>`.
//! The typed payload documents for the choreography live here as well, all
//! serialized as camelCase JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Routing keys (`kind` values) used across the platform.
pub mod keys {
    /// A trip was created; the rider is notified and driver search begins.
    pub const TRIP_EVENT_CREATED: &str = "trip.event.created";
    /// A driver was assigned to the trip.
    pub const TRIP_EVENT_DRIVER_ASSIGNED: &str = "trip.event.driver_assigned";
    /// No driver could be found for the trip.
    pub const TRIP_EVENT_NO_DRIVERS_FOUND: &str = "trip.event.no_drivers_found";

    /// Ask a specific driver to take a trip (forwarded to the driver client).
    pub const DRIVER_CMD_TRIP_REQUEST: &str = "driver.cmd.trip_request";
    /// Driver accepted a trip request.
    pub const DRIVER_CMD_TRIP_ACCEPT: &str = "driver.cmd.trip_accept";
    /// Driver declined a trip request.
    pub const DRIVER_CMD_TRIP_DECLINE: &str = "driver.cmd.trip_decline";
    /// Driver service confirmed an assignment.
    pub const DRIVER_EVENT_ASSIGNED: &str = "driver.event.assigned";
    /// Driver service could not produce an assignment.
    pub const DRIVER_EVENT_NOT_FOUND: &str = "driver.event.not_found";

    /// A payment session is ready for the rider.
    pub const PAYMENT_EVENT_SESSION_CREATED: &str = "payment.event.session_created";
    /// Payment settled.
    pub const PAYMENT_EVENT_SUCCESS: &str = "payment.event.success";
    /// Payment failed.
    pub const PAYMENT_EVENT_FAILED: &str = "payment.event.failed";
}

/// Queue names, one consumer task per queue.
pub mod queues {
    /// Gateway queue fanned out to rider connections.
    pub const RIDER_NOTIFICATIONS: &str = "gateway.rider_notifications";
    /// Gateway queue fanned out to driver connections.
    pub const DRIVER_NOTIFICATIONS: &str = "gateway.driver_notifications";
    /// Driver-service inbox (trip lifecycle + driver responses).
    pub const DRIVER_TRIP_EVENTS: &str = "driver.trip_events";
    /// Trip-service inbox for driver assignment outcomes.
    pub const TRIP_DRIVER_EVENTS: &str = "trip.driver_events";
    /// Trip-service inbox for payment settlement events.
    pub const TRIP_PAYMENT_EVENTS: &str = "trip.payment_events";
    /// Payment-service inbox for trip lifecycle events.
    pub const PAYMENT_TRIP_EVENTS: &str = "payment.trip_events";
}

/// Routing keys the gateway forwards to rider connections.
pub const RIDER_NOTIFICATION_KEYS: &[&str] = &[
    keys::TRIP_EVENT_CREATED,
    keys::TRIP_EVENT_DRIVER_ASSIGNED,
    keys::TRIP_EVENT_NO_DRIVERS_FOUND,
    keys::PAYMENT_EVENT_SESSION_CREATED,
    keys::PAYMENT_EVENT_SUCCESS,
    keys::PAYMENT_EVENT_FAILED,
];

/// Routing keys the gateway forwards to driver connections.
pub const DRIVER_NOTIFICATION_KEYS: &[&str] = &[keys::DRIVER_CMD_TRIP_REQUEST];

/// The unit exchanged over the broker.
///
/// `kind` mirrors the AMQP routing key the message is published under and is
/// never empty. `data` is an opaque structured payload whose schema is
/// determined by `kind`; some routing keys require extracting a nested field
/// before forwarding (see [`reshape_payload`]).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    /// Identity of the rider or driver this event concerns.
    #[serde(rename = "ownerID")]
    pub owner_id: String,

    /// Routing key identifying the event/command type.
    pub kind: String,

    /// Opaque structured payload (map or array when present).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl EventEnvelope {
    /// Build an envelope, enforcing the non-empty `kind` invariant.
    pub fn new(
        owner_id: impl Into<String>,
        kind: impl Into<String>,
        data: Option<Value>,
    ) -> crate::Result<Self> {
        // ---
        let kind = kind.into();
        if kind.is_empty() {
            return Err(crate::Error::InvalidEnvelope("empty kind".into()));
        }
        Ok(Self {
            owner_id: owner_id.into(),
            kind,
            data,
        })
    }

    /// Decode a raw broker message body.
    pub fn decode(body: &[u8]) -> crate::Result<Self> {
        // ---
        let env: Self = serde_json::from_slice(body)?;
        if env.kind.is_empty() {
            return Err(crate::Error::InvalidEnvelope("empty kind".into()));
        }
        Ok(env)
    }

    /// Serialize the envelope for publishing.
    pub fn encode(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode the payload into a typed document.
    ///
    /// Fails with [`crate::Error::InvalidEnvelope`] when the payload is
    /// absent, with a serialization error when it does not match `T`.
    pub fn payload<T: serde::de::DeserializeOwned>(&self) -> crate::Result<T> {
        // ---
        let data = self
            .data
            .as_ref()
            .ok_or_else(|| crate::Error::InvalidEnvelope(format!("{}: missing data", self.kind)))?;
        Ok(serde_json::from_value(data.clone())?)
    }
}

/// The unit forwarded over a client connection.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ClientMessage {
    /// Mirrors the originating envelope's `kind`.
    #[serde(rename = "type")]
    pub kind: String,

    /// The (possibly reshaped) payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Routing-key-specific payload reshaping for client-bound messages.
///
/// Trip requests carry a `{trip, driver}` offer document on the broker, but
/// the driver client expects the bare trip, so one level of nesting is
/// unwrapped. Every other key passes through unchanged; this is a point
/// extension mechanism, not a general transformation pipeline.
pub fn reshape_payload(kind: &str, data: Value) -> Value {
    // ---
    match kind {
        keys::DRIVER_CMD_TRIP_REQUEST => match data {
            Value::Object(mut map) => match map.remove("trip") {
                Some(trip) => trip,
                None => Value::Object(map),
            },
            other => other,
        },
        _ => data,
    }
}

// --------------------
// Typed payload documents
// --------------------

/// A geographic coordinate pair.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// A trip as carried on the wire.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TripDetails {
    pub id: String,
    pub rider_id: String,
    pub pickup: Coordinates,
    pub dropoff: Coordinates,
    /// Fare in minor currency units.
    pub fare_amount: u64,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<DriverProfile>,
}

/// A driver as advertised to riders and carried in assignments.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriverProfile {
    pub id: String,
    pub name: String,
    pub vehicle_plate: String,
}

/// Offer sent to a driver client: the trip plus the targeted driver.
///
/// The gateway unwraps the `trip` field before forwarding (see
/// [`reshape_payload`]).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TripRequestOffer {
    pub trip: TripDetails,
    pub driver: DriverProfile,
}

/// Driver response to a trip request (accept/decline), published by the
/// gateway on behalf of the driver client; the envelope owner is the driver.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriverTripResponse {
    pub trip_id: String,
}

/// A confirmed driver assignment.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriverAssignment {
    pub trip_id: String,
    pub rider_id: String,
    pub driver: DriverProfile,
}

/// Reference to a trip with no payload of its own.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TripRef {
    pub trip_id: String,
}

/// A payment session created for a trip.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSession {
    pub session_id: String,
    pub trip_id: String,
    pub rider_id: String,
    pub amount: u64,
    pub currency: String,
}

/// Settlement outcome for a payment session.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatus {
    pub trip_id: String,
    pub session_id: String,
}

/// Trip preview request (RPC).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TripPreviewRequest {
    pub rider_id: String,
    pub pickup: Coordinates,
    pub dropoff: Coordinates,
}

/// Trip preview response (RPC).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TripPreview {
    pub fare_amount: u64,
    pub currency: String,
    pub eta_minutes: u32,
}

/// Trip start request (RPC).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TripStartRequest {
    pub rider_id: String,
    pub pickup: Coordinates,
    pub dropoff: Coordinates,
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_wire_field_names() {
        // ---
        let env = EventEnvelope::new("rider-1", keys::TRIP_EVENT_CREATED, Some(json!({"a": 1})))
            .unwrap();
        let value: Value = serde_json::from_slice(&env.encode().unwrap()).unwrap();

        assert_eq!(value["ownerID"], "rider-1");
        assert_eq!(value["kind"], "trip.event.created");
        assert_eq!(value["data"]["a"], 1);
    }

    #[test]
    fn test_envelope_rejects_empty_kind() {
        // ---
        assert!(EventEnvelope::new("rider-1", "", None).is_err());

        let body = serde_json::to_vec(&json!({"ownerID": "r", "kind": ""})).unwrap();
        assert!(EventEnvelope::decode(&body).is_err());
    }

    #[test]
    fn test_envelope_data_optional() {
        // ---
        let body = serde_json::to_vec(&json!({"ownerID": "r", "kind": "trip.event.created"}))
            .unwrap();
        let env = EventEnvelope::decode(&body).unwrap();
        assert!(env.data.is_none());
    }

    #[test]
    fn test_client_message_type_field() {
        // ---
        let msg = ClientMessage {
            kind: keys::TRIP_EVENT_CREATED.into(),
            data: Some(json!({"tripId": "t9"})),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "trip.event.created");
    }

    #[test]
    fn test_trip_request_payload_unwraps_trip() {
        // ---
        let data = json!({"trip": {"id": "t1"}, "driver": {"id": "d1"}});
        let reshaped = reshape_payload(keys::DRIVER_CMD_TRIP_REQUEST, data);
        assert_eq!(reshaped, json!({"id": "t1"}));
    }

    #[test]
    fn test_trip_request_payload_without_trip_field_passes_through() {
        // ---
        let data = json!({"foo": "bar"});
        let reshaped = reshape_payload(keys::DRIVER_CMD_TRIP_REQUEST, data.clone());
        assert_eq!(reshaped, data);
    }

    #[test]
    fn test_other_keys_pass_through() {
        // ---
        let data = json!({"foo": "bar"});
        let reshaped = reshape_payload(keys::TRIP_EVENT_CREATED, data.clone());
        assert_eq!(reshaped, data);
    }

    #[test]
    fn test_typed_payload_round_trip() {
        // ---
        let trip = TripDetails {
            id: "t1".into(),
            rider_id: "rider-1".into(),
            pickup: Coordinates {
                latitude: 59.33,
                longitude: 18.06,
            },
            dropoff: Coordinates {
                latitude: 59.35,
                longitude: 18.10,
            },
            fare_amount: 2500,
            currency: "usd".into(),
            driver: None,
        };

        let env = EventEnvelope::new(
            &trip.rider_id,
            keys::TRIP_EVENT_CREATED,
            Some(serde_json::to_value(&trip).unwrap()),
        )
        .unwrap();

        let decoded: TripDetails = env.payload().unwrap();
        assert_eq!(decoded, trip);

        // camelCase on the wire
        let value = env.data.unwrap();
        assert!(value.get("riderId").is_some());
        assert!(value.get("fareAmount").is_some());
    }
}
