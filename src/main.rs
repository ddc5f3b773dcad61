use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chatrelay::api::{self, AppState};
use chatrelay::cli;
use chatrelay::emitter::PeriodicEmitter;
use chatrelay::limiters;
use chatrelay::notify;
use chatrelay::relay::RelayEngine;
use chatrelay::transport::UdpConnector;

fn init_tracing(json: bool) {
    let (json_layer, text_layer) = if json {
        (Some(tracing_subscriber::fmt::layer().json()), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer()))
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatrelay=debug,tower_http=debug".into()),
        )
        .with(json_layer)
        .with(text_layer)
        .init();
}

/// Resolve on Ctrl-C and tell every long-lived task to stop
async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown requested, draining connections");
    let _ = shutdown_tx.send(true);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse args and env vars
    let args = cli::Cli::parse();
    init_tracing(args.log_json);
    let settings = args.into_settings()?;
    let socket_address = settings.socket_address()?;

    let notifier = notify::from_settings(&settings.notifier);
    let engine = Arc::new(RelayEngine::from_settings(&settings, notifier));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweeper = limiters::spawn_expiry_sweeper(
        engine.limiter(),
        settings.rate_limit_sweep_interval,
        shutdown_rx.clone(),
    );

    let connector = UdpConnector::new(settings.emitter.destination.clone());
    let transport_stats = connector.stats();
    let emitter = PeriodicEmitter::new(
        engine.aggregate(),
        Arc::new(connector),
        settings.emitter.clone(),
    )
    .start();

    // Build Axum Router
    let state = AppState::new(
        engine.clone(),
        emitter.stats(),
        transport_stats,
        shutdown_rx,
    );
    let app = api::api(state);

    // Start server
    info!(
        "Starting chatrelay on {} (aggregate: {}, counting: {}, window: {}s)",
        socket_address,
        settings.aggregate_mode,
        settings.counting_policy,
        settings.rate_limit.window_seconds
    );
    axum::Server::bind(&socket_address)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    sweeper.await?;
    emitter.shutdown().await?;
    info!("chatrelay stopped");
    Ok(())
}
