// src/bin/trip-service.rs

//! Trip service process: owns trip records and the trip lifecycle events.
//!
//! Consumes driver assignment outcomes and payment settlements, and serves
//! the trip RPC surface (preview, start).

use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ridelink::consumers::trip::{DriverEventConsumer, PaymentEventConsumer};
use ridelink::{
    // ---
    connect_with_retry,
    create_bus,
    register_trip_handlers,
    Config,
    Error,
    EventPublisher,
    InMemoryTripService,
    RpcServer,
    Shutdown,
    TripService,
};

#[tokio::main]
async fn main() -> ExitCode {
    // ---
    let config = Config::from_env("trip-service");
    init_tracing();

    match run(config).await {
        Ok(()) | Err(Error::Canceled) => ExitCode::SUCCESS,
        Err(err) => {
            error!("trip-service failed: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> ridelink::Result<()> {
    // ---
    info!("trip-service starting (environment: {})", config.environment);

    let shutdown = Shutdown::new();
    shutdown.listen_for_interrupt();

    let bus = connect_with_retry("message broker", &config.retry, &shutdown.token(), || {
        create_bus(&config)
    })
    .await?;

    let publisher = EventPublisher::new(bus.clone());
    let trips: Arc<dyn TripService> = Arc::new(InMemoryTripService::new());

    DriverEventConsumer::new(bus.clone(), publisher.clone(), trips.clone())
        .start()
        .await?;
    PaymentEventConsumer::new(bus.clone(), trips.clone())
        .start()
        .await?;

    let server = RpcServer::new(bus.clone(), &config.rpc_endpoint);
    register_trip_handlers(&server, trips, publisher);
    server.start(&shutdown).await?;

    info!("trip-service ready");

    shutdown.drain(config.shutdown_grace).await;
    bus.close().await?;
    info!("trip-service stopped");
    Ok(())
}

fn init_tracing() {
    // ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}
