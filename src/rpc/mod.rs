// src/rpc/mod.rs

//! Request/response RPC over the message bus.
//!
//! The synchronous edges of the platform (trip previews, trip creation,
//! driver registration) run as correlated request/response pairs on a
//! routing-key namespace disjoint from the event choreography:
//!
//! - requests:  `rpc.<service>.requests`
//! - responses: `rpc.<node>.responses`
//!
//! Each service node subscribes to its request queue; each client node
//! subscribes to a response queue named after itself and matches responses
//! to in-flight requests by correlation id.

mod client;
mod server;
mod services;

pub use client::RpcClient;
pub use server::RpcServer;
pub use services::{
    register_driver_handlers, register_payment_handlers, register_trip_handlers, DriverRpc,
    PaymentRpc, TripRpc, DRIVER_SERVICE, PAYMENT_SERVICE, TRIP_SERVICE,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Routing key (and queue name) for a service's request stream.
pub fn request_key(service: &str) -> String {
    format!("rpc.{service}.requests")
}

/// Routing key (and queue name) for a node's response stream.
pub fn response_key(node: &str) -> String {
    format!("rpc.{node}.responses")
}

/// An RPC request on the wire.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RpcRequest {
    pub method: String,
    pub correlation_id: String,
    /// Routing key the response should be published under.
    pub reply_to: String,
    pub payload: Value,
}

/// An RPC response on the wire. Exactly one of `payload`/`error` is set.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RpcResponse {
    pub correlation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    #[test]
    fn test_route_helpers() {
        // ---
        assert_eq!(request_key("trip-service"), "rpc.trip-service.requests");
        assert_eq!(response_key("gateway-1"), "rpc.gateway-1.responses");
    }

    #[test]
    fn test_response_omits_absent_fields() {
        // ---
        let resp = RpcResponse {
            correlation_id: "c1".into(),
            payload: Some(json!({"ok": true})),
            error: None,
        };
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["correlationId"], "c1");
        assert!(value.get("error").is_none());
    }
}
