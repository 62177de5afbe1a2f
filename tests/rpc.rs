// tests/rpc.rs

//! Correlated request/response over a private in-memory hub.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use ridelink::{
    // ---
    create_memory_bus_with_hub,
    Error,
    MemoryHub,
    Result,
    RpcClient,
    RpcServer,
    Shutdown,
};

#[derive(Debug, Serialize, Deserialize)]
struct AddRequest {
    a: i32,
    b: i32,
}

#[derive(Debug, Serialize, Deserialize)]
struct AddResponse {
    sum: i32,
}

async fn start_math_server(hub: std::sync::Arc<MemoryHub>) -> Shutdown {
    // ---
    let shutdown = Shutdown::new();
    let bus = create_memory_bus_with_hub("math-service", hub);
    let server = RpcServer::new(bus, "math");

    server.register("add", |req: AddRequest| async move {
        Ok(AddResponse { sum: req.a + req.b })
    });
    server.register("fail", |_req: AddRequest| async move {
        Err::<AddResponse, _>(Error::Domain("arithmetic refused".into()))
    });

    server.start(&shutdown).await.unwrap();
    shutdown
}

#[tokio::test]
async fn test_basic_request() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let _server = start_math_server(hub.clone()).await;

    let bus = create_memory_bus_with_hub("client", hub);
    let client = RpcClient::start(bus, "client-basic", Duration::from_secs(2)).await?;

    let resp: AddResponse = client.call("math", "add", &AddRequest { a: 2, b: 3 }).await?;
    assert_eq!(resp.sum, 5);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_requests_correlate_independently() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let _server = start_math_server(hub.clone()).await;

    let bus = create_memory_bus_with_hub("client", hub);
    let client = RpcClient::start(bus, "client-concurrent", Duration::from_secs(2)).await?;

    let mut handles = Vec::new();
    for i in 0..10i32 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            let resp: AddResponse = client.call("math", "add", &AddRequest { a: i, b: i }).await?;
            Ok::<_, Error>((i, resp.sum))
        }));
    }

    for handle in handles {
        let (i, sum) = handle.await.unwrap()?;
        // Each response matched its own request.
        assert_eq!(sum, i * 2);
    }
    Ok(())
}

#[tokio::test]
async fn test_unknown_method_returns_error_response() {
    // ---
    let hub = MemoryHub::new();
    let _server = start_math_server(hub.clone()).await;

    let bus = create_memory_bus_with_hub("client", hub);
    let client = RpcClient::start(bus, "client-unknown", Duration::from_secs(2))
        .await
        .unwrap();

    let err = client
        .call::<_, AddResponse>("math", "subtract", &AddRequest { a: 1, b: 1 })
        .await
        .unwrap_err();

    match err {
        Error::Rpc(msg) => assert!(msg.contains("unknown method")),
        other => panic!("expected rpc error, got {other}"),
    }
}

#[tokio::test]
async fn test_handler_failure_is_reported_not_dropped() {
    // ---
    let hub = MemoryHub::new();
    let _server = start_math_server(hub.clone()).await;

    let bus = create_memory_bus_with_hub("client", hub);
    let client = RpcClient::start(bus, "client-failure", Duration::from_secs(2))
        .await
        .unwrap();

    let err = client
        .call::<_, AddResponse>("math", "fail", &AddRequest { a: 1, b: 1 })
        .await
        .unwrap_err();

    match err {
        Error::Rpc(msg) => assert!(msg.contains("arithmetic refused")),
        other => panic!("expected rpc error, got {other}"),
    }
}

#[tokio::test]
async fn test_request_to_absent_service_times_out() {
    // ---
    let hub = MemoryHub::new();

    let bus = create_memory_bus_with_hub("client", hub);
    let client = RpcClient::start(bus, "client-timeout", Duration::from_millis(100))
        .await
        .unwrap();

    let start = std::time::Instant::now();
    let err = client
        .call::<_, AddResponse>("nobody", "add", &AddRequest { a: 1, b: 1 })
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Timeout));
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_in_flight_requests_drain_on_shutdown() {
    // ---
    let hub = MemoryHub::new();
    let shutdown = Shutdown::new();

    let server_bus = create_memory_bus_with_hub("math-service", hub.clone());
    let server = RpcServer::new(server_bus, "math");
    server.register("slow_add", |req: AddRequest| async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(AddResponse { sum: req.a + req.b })
    });
    server.start(&shutdown).await.unwrap();

    let bus = create_memory_bus_with_hub("client", hub);
    let client = RpcClient::start(bus, "client-drain", Duration::from_secs(2))
        .await
        .unwrap();

    let call = tokio::spawn({
        let client = client.clone();
        async move {
            client
                .call::<_, AddResponse>("math", "slow_add", &AddRequest { a: 4, b: 5 })
                .await
        }
    });

    // Let the request reach the handler, then trigger shutdown.
    tokio::time::sleep(Duration::from_millis(30)).await;
    shutdown.trigger();

    // The in-flight handler runs to completion inside the grace period.
    let clean = timeout(Duration::from_secs(2), shutdown.drain(Duration::from_secs(1)))
        .await
        .expect("drain stalled");
    assert!(clean);

    let resp = call.await.unwrap().unwrap();
    assert_eq!(resp.sum, 9);
}
