// src/rpc/server.rs

//! RPC server side: handler registry and request dispatch.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::{request_key, RpcRequest, RpcResponse};
use crate::{
    // ---
    log_debug,
    log_warn,
    BusPtr,
    Error,
    QueueBinding,
    Result,
    RoutingKey,
    Shutdown,
};

type BoxFuture<'a, T> = std::pin::Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Type-erased async handler over JSON values.
trait HandlerFn: Send + Sync {
    fn call(&self, payload: Value) -> BoxFuture<'static, Result<Value>>;
}

struct Handler<F, Fut, TReq, TResp>
where
    F: Fn(TReq) -> Fut + Send + Sync,
    Fut: Future<Output = Result<TResp>> + Send,
    TReq: DeserializeOwned,
    TResp: Serialize,
{
    func: F,
    _phantom: std::marker::PhantomData<fn(TReq, TResp, Fut)>,
}

impl<F, Fut, TReq, TResp> HandlerFn for Handler<F, Fut, TReq, TResp>
where
    F: Fn(TReq) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<TResp>> + Send + 'static,
    TReq: DeserializeOwned + Send + 'static,
    TResp: Serialize + Send + 'static,
{
    fn call(&self, payload: Value) -> BoxFuture<'static, Result<Value>> {
        // ---
        let req: TReq = match serde_json::from_value(payload) {
            Ok(req) => req,
            Err(err) => return Box::pin(async move { Err(err.into()) }),
        };

        let fut = (self.func)(req);

        Box::pin(async move {
            let resp = fut.await?;
            Ok(serde_json::to_value(resp)?)
        })
    }
}

/// Acquire mutex guard, ignoring poisoning.
fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Serves a service's request queue, dispatching to registered handlers.
///
/// Every request gets a response: handler results on success, an error
/// document for unknown methods, undecodable payloads, or failing handlers.
/// Requests execute concurrently on the shutdown-owned task tracker so that
/// in-flight calls are included in the drain on shutdown.
pub struct RpcServer {
    // ---
    bus: BusPtr,
    service: String,
    handlers: Mutex<HashMap<String, Arc<dyn HandlerFn>>>,
}

impl RpcServer {
    pub fn new(bus: BusPtr, service: &str) -> Arc<Self> {
        // ---
        Arc::new(Self {
            bus,
            service: service.to_string(),
            handlers: Mutex::new(HashMap::new()),
        })
    }

    /// Register a typed handler for `method`. Re-registering replaces.
    pub fn register<TReq, TResp, F, Fut>(&self, method: &str, handler: F)
    where
        TReq: DeserializeOwned + Send + 'static,
        TResp: Serialize + Send + 'static,
        F: Fn(TReq) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TResp>> + Send + 'static,
    {
        // ---
        let handler = Handler {
            func: handler,
            _phantom: std::marker::PhantomData,
        };

        let mut handlers = lock_ignore_poison(&self.handlers);
        handlers.insert(method.to_string(), Arc::new(handler));
    }

    /// Bind the service's request queue and start the dispatch loop on the
    /// shutdown tracker.
    pub async fn start(self: Arc<Self>, shutdown: &Shutdown) -> Result<()> {
        // ---
        let key = request_key(&self.service);
        let binding = QueueBinding::new(key.as_str(), &[key.as_str()]);
        let mut handle = self.bus.subscribe(binding).await?;

        let token = shutdown.token();
        let tracker = shutdown.tracker().clone();
        let server = self;

        shutdown.tracker().spawn(async move {
            log_debug!("rpc server started: {}", server.service);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    delivery = handle.inbox.recv() => {
                        let Some(delivery) = delivery else { break };

                        let request: RpcRequest = match serde_json::from_slice(&delivery.body) {
                            Ok(req) => req,
                            Err(_err) => {
                                log_warn!("rpc server: failed to decode request: {_err}");
                                continue;
                            }
                        };

                        let server = server.clone();
                        tracker.spawn(async move {
                            server.dispatch(request).await;
                        });
                    }
                }
            }
            log_debug!("rpc server stopped: {}", server.service);
        });

        Ok(())
    }

    async fn dispatch(&self, request: RpcRequest) {
        // ---
        log_debug!(
            "rpc {}/{} ({})",
            self.service,
            request.method,
            request.correlation_id
        );

        let handler = {
            let handlers = lock_ignore_poison(&self.handlers);
            handlers.get(&request.method).cloned()
        };

        let response = match handler {
            Some(handler) => match handler.call(request.payload).await {
                Ok(payload) => RpcResponse {
                    correlation_id: request.correlation_id,
                    payload: Some(payload),
                    error: None,
                },
                Err(err) => {
                    log_warn!("rpc {}/{} failed: {err}", self.service, request.method);
                    RpcResponse {
                        correlation_id: request.correlation_id,
                        payload: None,
                        error: Some(err.to_string()),
                    }
                }
            },
            None => {
                log_warn!("rpc {}: unknown method {}", self.service, request.method);
                RpcResponse {
                    correlation_id: request.correlation_id,
                    payload: None,
                    error: Some(format!("unknown method: {}", request.method)),
                }
            }
        };

        if let Err(_err) = self.respond(&request.reply_to, &response).await {
            log_warn!("rpc server: failed to publish response: {_err}");
        } else {
            log_debug!("rpc {}/{} answered", self.service, request.method);
        }
    }

    async fn respond(&self, reply_to: &str, response: &RpcResponse) -> Result<()> {
        // ---
        if reply_to.is_empty() {
            return Err(Error::Rpc("request carried no reply_to".into()));
        }
        let body = serde_json::to_vec(response)?;
        self.bus
            .publish(RoutingKey::from(reply_to), Bytes::from(body))
            .await
    }
}
