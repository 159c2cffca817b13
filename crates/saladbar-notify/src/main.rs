use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use saladbar_notify::{
    broker::{BrokerPool, PoolConfig, Relay},
    config::{Args, NotifyConfig},
    create_router,
    state::AppState,
    validator::PathValidator,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    let log_filter = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("saladbar_notify={},tower_http=info", log_filter).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config: NotifyConfig = args.into();
    let listen_addr = config.listen_addr();

    // The relay has to be listening before the pool dials it
    let relay = if config.embedded_relay {
        Some(Relay::bind(&config.broker_ingress, &config.broker_egress)?)
    } else {
        None
    };

    let broker = Arc::new(BrokerPool::connect(PoolConfig::from(&config))?);
    let validator = PathValidator::from_config(&config)?;
    tracing::info!("Checking channels against {}", validator.base_url());

    let state = AppState::new(broker, validator, config);
    let app = create_router(state);

    let listener = TcpListener::bind(&listen_addr).await?;

    tracing::info!("Salad bar notify starting on ws://{}", listen_addr);
    tracing::info!("Health check at http://{}/health", listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(relay) = relay {
        relay.shutdown();
    }
    tracing::info!("Salad bar notify stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
