// src/bin/payment-service.rs

//! Payment service process: opens checkout sessions for assigned trips.
//!
//! Consumes trip assignment events and serves the payment RPC surface. Runs
//! against the mock payment processor unless wired to a real one.

use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ridelink::consumers::payment::TripEventConsumer;
use ridelink::{
    // ---
    connect_with_retry,
    create_bus,
    register_payment_handlers,
    CheckoutService,
    Config,
    Error,
    EventPublisher,
    MockPaymentProcessor,
    PaymentService,
    RpcServer,
    Shutdown,
};

#[tokio::main]
async fn main() -> ExitCode {
    // ---
    let config = Config::from_env("payment-service");
    init_tracing();

    match run(config).await {
        Ok(()) | Err(Error::Canceled) => ExitCode::SUCCESS,
        Err(err) => {
            error!("payment-service failed: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> ridelink::Result<()> {
    // ---
    info!(
        "payment-service starting (environment: {})",
        config.environment
    );

    let shutdown = Shutdown::new();
    shutdown.listen_for_interrupt();

    let bus = connect_with_retry("message broker", &config.retry, &shutdown.token(), || {
        create_bus(&config)
    })
    .await?;

    let publisher = EventPublisher::new(bus.clone());
    let payments: Arc<dyn PaymentService> =
        Arc::new(CheckoutService::new(MockPaymentProcessor::new()));

    TripEventConsumer::new(bus.clone(), publisher, payments.clone())
        .start()
        .await?;

    let server = RpcServer::new(bus.clone(), &config.rpc_endpoint);
    register_payment_handlers(&server, payments);
    server.start(&shutdown).await?;

    info!("payment-service ready");

    shutdown.drain(config.shutdown_grace).await;
    bus.close().await?;
    info!("payment-service stopped");
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
