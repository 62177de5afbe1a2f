use thiserror::Error;

/// Errors that can occur across the messaging fabric.
///
/// Only [`Error::Canceled`] and bootstrap exhaustion are treated as fatal by
/// the service binaries; every per-message failure is contained at the point
/// of occurrence so one bad message never stalls a consumer loop.
#[derive(Error, Debug)]
pub enum Error {
    /// The target user has no live connection in the registry.
    ///
    /// Expected steady-state occurrence, not an anomaly: the owning message
    /// is dropped and the consumer loop continues.
    #[error("no live connection for owner {0}")]
    NotConnected(String),

    /// A write to a connected client's sink failed.
    #[error("client delivery failed: {0}")]
    Delivery(#[from] SinkError),

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Broker or bus transport failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// An event envelope violated a wire invariant (empty kind, missing or
    /// non-structured payload where one is required).
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// A bootstrap wait was interrupted by the shutdown signal.
    #[error("bootstrap canceled by shutdown signal")]
    Canceled,

    /// RPC request timed out waiting for a response.
    #[error("rpc request timed out")]
    Timeout,

    /// The remote RPC handler returned an error.
    #[error("rpc call failed: {0}")]
    Rpc(String),

    /// Business-logic failure inside a Service capability.
    #[error("domain error: {0}")]
    Domain(String),
}

/// Failure modes of a single client connection sink.
///
/// The gateway's queue consumer uses the distinction to decide whether to
/// evict the registry entry ([`SinkError::Closed`]) or merely drop the one
/// message ([`SinkError::Busy`]).
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SinkError {
    /// The client connection is gone; the registry entry is stale.
    #[error("client connection closed")]
    Closed,

    /// The client's outbound buffer is full (slow consumer).
    #[error("client send buffer full")]
    Busy,
}

/// Result type alias for fabric operations.
pub type Result<T> = std::result::Result<T, Error>;
