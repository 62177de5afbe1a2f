// tests/choreography.rs

//! Full trip lifecycle over a private in-memory hub: every service's
//! consumers and the gateway bridge wired together the way the binaries
//! wire them, driven end to end from the rider's RPC call to the payment
//! session landing on the rider's connection.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::timeout;

use ridelink::consumers::{driver, payment, trip};
use ridelink::contracts::{Coordinates, DriverProfile, TripStartRequest};
use ridelink::{
    // ---
    create_memory_bus_with_hub,
    forward_client_command,
    keys,
    queues,
    register_driver_handlers,
    register_payment_handlers,
    register_trip_handlers,
    BusPtr,
    ChannelSink,
    CheckoutService,
    ClientMessage,
    ConnectionRegistry,
    DriverRpc,
    DriverService,
    EventPublisher,
    InMemoryDriverService,
    InMemoryTripService,
    MemoryHub,
    MockPaymentProcessor,
    PaymentRpc,
    QueueBinding,
    QueueConsumer,
    RpcClient,
    RpcServer,
    Shutdown,
    TripRpc,
    TripService,
    DRIVER_NOTIFICATION_KEYS,
    DRIVER_SERVICE,
    PAYMENT_SERVICE,
    RIDER_NOTIFICATION_KEYS,
    TRIP_SERVICE,
};

struct Platform {
    // ---
    gateway_bus: BusPtr,
    registry: Arc<ConnectionRegistry>,
    drivers: Arc<InMemoryDriverService>,
    trips: Arc<InMemoryTripService>,
    _shutdown: Shutdown,
}

impl Platform {
    /// Wire all services onto one private hub, mirroring the binaries.
    async fn start(hub: Arc<MemoryHub>) -> Self {
        // ---
        let shutdown = Shutdown::new();

        // Trip service.
        let trip_bus = create_memory_bus_with_hub("trip-service", hub.clone());
        let trips = Arc::new(InMemoryTripService::new());
        let trips_dyn: Arc<dyn TripService> = trips.clone();
        let trip_publisher = EventPublisher::new(trip_bus.clone());
        trip::DriverEventConsumer::new(trip_bus.clone(), trip_publisher.clone(), trips_dyn.clone())
            .start()
            .await
            .unwrap();
        trip::PaymentEventConsumer::new(trip_bus.clone(), trips_dyn.clone())
            .start()
            .await
            .unwrap();
        let server = RpcServer::new(trip_bus.clone(), TRIP_SERVICE);
        register_trip_handlers(&server, trips_dyn, trip_publisher);
        server.start(&shutdown).await.unwrap();

        // Driver service.
        let driver_bus = create_memory_bus_with_hub("driver-service", hub.clone());
        let drivers = Arc::new(InMemoryDriverService::new());
        driver::TripEventConsumer::new(
            driver_bus.clone(),
            EventPublisher::new(driver_bus.clone()),
            drivers.clone(),
        )
        .start()
        .await
        .unwrap();
        let server = RpcServer::new(driver_bus.clone(), DRIVER_SERVICE);
        register_driver_handlers(&server, drivers.clone());
        server.start(&shutdown).await.unwrap();

        // Payment service.
        let payment_bus = create_memory_bus_with_hub("payment-service", hub.clone());
        let payments = Arc::new(CheckoutService::new(MockPaymentProcessor::new()));
        payment::TripEventConsumer::new(
            payment_bus.clone(),
            EventPublisher::new(payment_bus.clone()),
            payments.clone(),
        )
        .start()
        .await
        .unwrap();
        let server = RpcServer::new(payment_bus.clone(), PAYMENT_SERVICE);
        register_payment_handlers(&server, payments);
        server.start(&shutdown).await.unwrap();

        // Gateway.
        let gateway_bus = create_memory_bus_with_hub("gateway", hub);
        let registry = ConnectionRegistry::new();
        QueueConsumer::new(
            gateway_bus.clone(),
            registry.clone(),
            QueueBinding::new(queues::RIDER_NOTIFICATIONS, RIDER_NOTIFICATION_KEYS),
        )
        .start()
        .await
        .unwrap();
        QueueConsumer::new(
            gateway_bus.clone(),
            registry.clone(),
            QueueBinding::new(queues::DRIVER_NOTIFICATIONS, DRIVER_NOTIFICATION_KEYS),
        )
        .start()
        .await
        .unwrap();

        Self {
            gateway_bus,
            registry,
            drivers,
            trips,
            _shutdown: shutdown,
        }
    }

    async fn connect_client(&self, owner_id: &str) -> tokio::sync::mpsc::Receiver<ClientMessage> {
        // ---
        let (sink, rx) = ChannelSink::new(16);
        self.registry.register(owner_id, sink).await;
        rx
    }
}

async fn recv(rx: &mut tokio::sync::mpsc::Receiver<ClientMessage>) -> ClientMessage {
    // ---
    timeout(Duration::from_secs(3), rx.recv())
        .await
        .expect("timed out waiting for client message")
        .expect("sink channel closed")
}

fn start_request() -> TripStartRequest {
    TripStartRequest {
        rider_id: "rider-1".into(),
        pickup: Coordinates {
            latitude: 59.33,
            longitude: 18.06,
        },
        dropoff: Coordinates {
            latitude: 59.40,
            longitude: 18.12,
        },
    }
}

#[tokio::test]
async fn test_trip_flow_from_request_to_payment_session() {
    // ---
    let platform = Platform::start(MemoryHub::new()).await;

    let rpc = RpcClient::start(
        platform.gateway_bus.clone(),
        "gateway-test",
        Duration::from_secs(3),
    )
    .await
    .unwrap();

    // The driver comes online through the gateway's RPC client.
    let registered = DriverRpc::new(rpc.clone())
        .register(&DriverProfile {
            id: "driver-1".into(),
            name: "Avery".into(),
            vehicle_plate: "RID-001".into(),
        })
        .await
        .unwrap();
    assert_eq!(registered.id, "driver-1");

    let mut rider = platform.connect_client("rider-1").await;
    let mut driver = platform.connect_client("driver-1").await;

    // The rider starts a trip the same way.
    let trip = TripRpc::new(rpc).start(&start_request()).await.unwrap();
    assert_eq!(trip.rider_id, "rider-1");
    assert!(trip.driver.is_none());

    // Rider sees the trip creation.
    let created = recv(&mut rider).await;
    assert_eq!(created.kind, keys::TRIP_EVENT_CREATED);
    assert_eq!(created.data.unwrap()["id"], trip.id.as_str());

    // The matched driver receives the offer, reshaped to the bare trip.
    let offer = recv(&mut driver).await;
    assert_eq!(offer.kind, keys::DRIVER_CMD_TRIP_REQUEST);
    assert_eq!(offer.data.unwrap()["id"], trip.id.as_str());

    // Driver accepts through the gateway.
    let gateway_publisher = EventPublisher::new(platform.gateway_bus.clone());
    forward_client_command(
        &gateway_publisher,
        "driver-1",
        ClientMessage {
            kind: keys::DRIVER_CMD_TRIP_ACCEPT.into(),
            data: Some(json!({"tripId": trip.id})),
        },
    )
    .await
    .unwrap();

    // Rider sees the assignment with the driver attached...
    let assigned = recv(&mut rider).await;
    assert_eq!(assigned.kind, keys::TRIP_EVENT_DRIVER_ASSIGNED);
    let assigned_trip = assigned.data.unwrap();
    assert_eq!(assigned_trip["driver"]["id"], "driver-1");

    // ...followed by the payment session from the mock processor.
    let session = recv(&mut rider).await;
    assert_eq!(session.kind, keys::PAYMENT_EVENT_SESSION_CREATED);
    let session = session.data.unwrap();
    assert_eq!(session["tripId"], trip.id.as_str());
    let session_id = session["sessionId"].as_str().unwrap();
    assert!(session_id.starts_with("mock_session_"));

    // The processor's settlement webhook (out of scope here) lands as a
    // payment event: the rider is notified and the trip records it.
    gateway_publisher
        .publish(
            keys::PAYMENT_EVENT_SUCCESS,
            "rider-1",
            Some(json!({"tripId": trip.id, "sessionId": session_id})),
        )
        .await
        .unwrap();

    let settled = recv(&mut rider).await;
    assert_eq!(settled.kind, keys::PAYMENT_EVENT_SUCCESS);

    for _ in 0..40 {
        if platform.trips.settlement(&trip.id).await == Some(true) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("payment settlement was not recorded");
}

#[tokio::test]
async fn test_no_available_driver_reports_back_to_rider() {
    // ---
    let platform = Platform::start(MemoryHub::new()).await;
    let mut rider = platform.connect_client("rider-1").await;

    // No driver registered.
    let rpc = RpcClient::start(
        platform.gateway_bus.clone(),
        "gateway-test",
        Duration::from_secs(3),
    )
    .await
    .unwrap();
    let trip = TripRpc::new(rpc).start(&start_request()).await.unwrap();

    let created = recv(&mut rider).await;
    assert_eq!(created.kind, keys::TRIP_EVENT_CREATED);

    let not_found = recv(&mut rider).await;
    assert_eq!(not_found.kind, keys::TRIP_EVENT_NO_DRIVERS_FOUND);
    assert_eq!(not_found.data.unwrap()["tripId"], trip.id.as_str());
}

#[tokio::test]
async fn test_decline_by_only_driver_exhausts_the_search() {
    // ---
    let platform = Platform::start(MemoryHub::new()).await;

    platform
        .drivers
        .register_driver(DriverProfile {
            id: "driver-1".into(),
            name: "Avery".into(),
            vehicle_plate: "RID-001".into(),
        })
        .await
        .unwrap();

    let mut rider = platform.connect_client("rider-1").await;
    let mut driver = platform.connect_client("driver-1").await;

    let rpc = RpcClient::start(
        platform.gateway_bus.clone(),
        "gateway-test",
        Duration::from_secs(3),
    )
    .await
    .unwrap();
    let trip = TripRpc::new(rpc).start(&start_request()).await.unwrap();

    assert_eq!(recv(&mut rider).await.kind, keys::TRIP_EVENT_CREATED);
    assert_eq!(recv(&mut driver).await.kind, keys::DRIVER_CMD_TRIP_REQUEST);

    let gateway_publisher = EventPublisher::new(platform.gateway_bus.clone());
    forward_client_command(
        &gateway_publisher,
        "driver-1",
        ClientMessage {
            kind: keys::DRIVER_CMD_TRIP_DECLINE.into(),
            data: Some(json!({"tripId": trip.id})),
        },
    )
    .await
    .unwrap();

    // The declining driver is not re-offered the same trip; with nobody
    // else available the search ends.
    let not_found = recv(&mut rider).await;
    assert_eq!(not_found.kind, keys::TRIP_EVENT_NO_DRIVERS_FOUND);

    // And the driver got no second offer.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(driver.try_recv().is_err());
}

#[tokio::test]
async fn test_preview_and_payment_session_over_rpc() {
    // ---
    let platform = Platform::start(MemoryHub::new()).await;

    let rpc = RpcClient::start(
        platform.gateway_bus.clone(),
        "gateway-test",
        Duration::from_secs(3),
    )
    .await
    .unwrap();

    let trips = TripRpc::new(rpc.clone());
    let req = start_request();
    let preview = trips
        .preview(&ridelink::contracts::TripPreviewRequest {
            rider_id: req.rider_id.clone(),
            pickup: req.pickup,
            dropoff: req.dropoff,
        })
        .await
        .unwrap();
    assert!(preview.fare_amount > 0);
    assert!(preview.eta_minutes > 0);

    // Starting the same trip quotes the same fare.
    let trip = trips.start(&req).await.unwrap();
    assert_eq!(trip.fare_amount, preview.fare_amount);

    // A payment session can also be opened out of band of the choreography.
    let session = PaymentRpc::new(rpc).create_session(&trip).await.unwrap();
    assert_eq!(session.trip_id, trip.id);
    assert_eq!(session.amount, trip.fare_amount);
    assert!(session.session_id.starts_with("mock_session_"));
}
