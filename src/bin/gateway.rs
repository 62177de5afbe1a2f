// src/bin/gateway.rs

//! API gateway process: bridges broker events to live client connections.
//!
//! Runs one queue consumer per notification queue (rider and driver), both
//! fanning out through a shared [`ConnectionRegistry`]. The client-facing
//! connection layer (WebSocket handshake, auth) registers each connection's
//! sink with the registry and forwards inbound commands through
//! [`forward_client_command`](ridelink::forward_client_command).

use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ridelink::{
    // ---
    connect_with_retry,
    create_bus,
    queues,
    Config,
    ConnectionRegistry,
    Error,
    QueueBinding,
    QueueConsumer,
    Shutdown,
    DRIVER_NOTIFICATION_KEYS,
    RIDER_NOTIFICATION_KEYS,
};

#[tokio::main]
async fn main() -> ExitCode {
    // ---
    let config = Config::from_env("gateway");
    init_tracing();

    match run(config).await {
        Ok(()) | Err(Error::Canceled) => ExitCode::SUCCESS,
        Err(err) => {
            error!("gateway failed: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> ridelink::Result<()> {
    // ---
    info!("gateway starting (environment: {})", config.environment);

    let shutdown = Shutdown::new();
    shutdown.listen_for_interrupt();

    let bus = connect_with_retry("message broker", &config.retry, &shutdown.token(), || {
        create_bus(&config)
    })
    .await?;

    let registry = ConnectionRegistry::new();

    QueueConsumer::new(
        bus.clone(),
        registry.clone(),
        QueueBinding::new(queues::RIDER_NOTIFICATIONS, RIDER_NOTIFICATION_KEYS),
    )
    .start()
    .await?;

    QueueConsumer::new(
        bus.clone(),
        registry.clone(),
        QueueBinding::new(queues::DRIVER_NOTIFICATIONS, DRIVER_NOTIFICATION_KEYS),
    )
    .start()
    .await?;

    info!("gateway ready; notification bridges running");

    shutdown.drain(config.shutdown_grace).await;
    bus.close().await?;
    info!("gateway stopped");
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
