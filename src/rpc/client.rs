// src/rpc/client.rs

//! RPC client side: correlation tracking and response matching.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::time;
use uuid::Uuid;

use super::{request_key, response_key, RpcRequest, RpcResponse};
use crate::{log_debug, log_warn, BusPtr, Error, QueueBinding, Result, RoutingKey};

/// Map of in-flight requests awaiting responses, keyed by correlation id.
type PendingRequests = Arc<Mutex<HashMap<String, oneshot::Sender<RpcResponse>>>>;

/// Acquire mutex guard, ignoring poisoning.
fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Issues correlated requests over the bus and waits for responses on the
/// node's own response queue.
///
/// Cheap to share; one client per process is the intended shape.
pub struct RpcClient {
    // ---
    bus: BusPtr,
    node_id: String,
    timeout: Duration,
    pending: PendingRequests,
}

impl RpcClient {
    /// Subscribe to this node's response queue and start the matcher task.
    ///
    /// The matcher runs until the bus shuts down; responses with no pending
    /// request (late arrivals after a timeout) are dropped.
    pub async fn start(bus: BusPtr, node_id: &str, timeout: Duration) -> Result<Arc<Self>> {
        // ---
        let reply_key = response_key(node_id);
        let binding = QueueBinding::new(reply_key.as_str(), &[reply_key.as_str()]);
        let mut handle = bus.subscribe(binding).await?;

        let pending: PendingRequests = Arc::new(Mutex::new(HashMap::new()));
        let matcher_pending = pending.clone();

        tokio::spawn(async move {
            while let Some(delivery) = handle.inbox.recv().await {
                let response: RpcResponse = match serde_json::from_slice(&delivery.body) {
                    Ok(resp) => resp,
                    Err(_err) => {
                        log_warn!("rpc client: failed to decode response: {_err}");
                        continue;
                    }
                };

                let tx = {
                    let mut pending = lock_ignore_poison(&matcher_pending);
                    pending.remove(&response.correlation_id)
                };

                match tx {
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    None => {
                        log_debug!(
                            "rpc client: no pending request for {}",
                            response.correlation_id
                        );
                    }
                }
            }
            log_debug!("rpc client matcher stopped");
        });

        Ok(Arc::new(Self {
            bus,
            node_id: node_id.to_string(),
            timeout,
            pending,
        }))
    }

    /// Call `method` on `service` and wait for the typed response.
    ///
    /// Fails with [`Error::Timeout`] when no response arrives within the
    /// client's timeout and with [`Error::Rpc`] when the server reports a
    /// handler error.
    pub async fn call<TReq, TResp>(&self, service: &str, method: &str, req: &TReq) -> Result<TResp>
    where
        TReq: Serialize,
        TResp: DeserializeOwned,
    {
        // ---
        let correlation_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = lock_ignore_poison(&self.pending);
            pending.insert(correlation_id.clone(), tx);
        }

        let request = RpcRequest {
            method: method.to_string(),
            correlation_id: correlation_id.clone(),
            reply_to: response_key(&self.node_id),
            payload: serde_json::to_value(req)?,
        };
        let body = serde_json::to_vec(&request)?;

        log_debug!("rpc call {service}/{method} ({correlation_id})");
        if let Err(err) = self
            .bus
            .publish(RoutingKey::from(request_key(service)), Bytes::from(body))
            .await
        {
            let mut pending = lock_ignore_poison(&self.pending);
            pending.remove(&correlation_id);
            return Err(err);
        }

        let response = match time::timeout(self.timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_closed)) => {
                return Err(Error::Transport("response channel closed".into()));
            }
            Err(_elapsed) => {
                let mut pending = lock_ignore_poison(&self.pending);
                pending.remove(&correlation_id);
                return Err(Error::Timeout);
            }
        };

        if let Some(message) = response.error {
            return Err(Error::Rpc(message));
        }

        let payload = response
            .payload
            .ok_or_else(|| Error::Rpc(format!("{method}: response carried no payload")))?;
        Ok(serde_json::from_value(payload)?)
    }
}
