// src/bin/driver-service.rs

//! Driver service process: matches drivers to trips.
//!
//! Consumes trip creation events and driver responses, and serves the
//! driver RPC surface (registration).

use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ridelink::consumers::driver::TripEventConsumer;
use ridelink::{
    // ---
    connect_with_retry,
    create_bus,
    register_driver_handlers,
    Config,
    DriverService,
    Error,
    EventPublisher,
    InMemoryDriverService,
    RpcServer,
    Shutdown,
};

#[tokio::main]
async fn main() -> ExitCode {
    // ---
    let config = Config::from_env("driver-service");
    init_tracing();

    match run(config).await {
        Ok(()) | Err(Error::Canceled) => ExitCode::SUCCESS,
        Err(err) => {
            error!("driver-service failed: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> ridelink::Result<()> {
    // ---
    info!(
        "driver-service starting (environment: {})",
        config.environment
    );

    let shutdown = Shutdown::new();
    shutdown.listen_for_interrupt();

    let bus = connect_with_retry("message broker", &config.retry, &shutdown.token(), || {
        create_bus(&config)
    })
    .await?;

    let publisher = EventPublisher::new(bus.clone());
    let drivers: Arc<dyn DriverService> = Arc::new(InMemoryDriverService::new());

    TripEventConsumer::new(bus.clone(), publisher, drivers.clone())
        .start()
        .await?;

    let server = RpcServer::new(bus.clone(), &config.rpc_endpoint);
    register_driver_handlers(&server, drivers);
    server.start(&shutdown).await?;

    info!("driver-service ready");

    shutdown.drain(config.shutdown_grace).await;
    bus.close().await?;
    info!("driver-service stopped");
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
