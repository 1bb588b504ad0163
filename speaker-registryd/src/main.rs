mod api;
mod commands;
mod config;
mod control;
mod device;
mod events;
mod registry;
mod ssdp;

#[cfg(test)]
mod test_support;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use crate::config::Config;
use crate::control::ControlClient;
use crate::device::{DeviceFilter, Hydrator};
use crate::events::EventListener;
use crate::registry::RegistryHandle;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("speaker_registryd=info,shared=info"))
        )
        .init();

    tracing::info!("Starting speaker-registryd");

    // Load config; built-in defaults when no path is given
    let config = match std::env::args().nth(1) {
        Some(path) => {
            let config = Config::load(&path)
                .with_context(|| format!("Failed to load config from {}", path))?;
            tracing::info!("Loaded config from {}", path);
            config
        }
        None => {
            tracing::info!("No config file given, using defaults");
            Config::default()
        }
    };
    config.validate().context("Invalid configuration")?;

    // Start the registry engine thread
    let registry = RegistryHandle::spawn();

    // Bind the event socket first so its port can be advertised
    let listener = EventListener::bind(config.events.bind)
        .await
        .with_context(|| format!("Failed to bind event socket on {}", config.events.bind))?;
    let event_port = listener.port();
    tracing::info!("Event listener bound on port {}", event_port);

    let http = reqwest::Client::builder()
        .timeout(config.control.timeout())
        .build()
        .context("Failed to build HTTP client")?;
    let control = ControlClient::new(http.clone(), config.control.app_name.clone(), event_port);

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Spawn discovery task
    let (service_tx, service_rx) = mpsc::channel(256);
    let discovery_cancel = cancel.clone();
    let discovery_config = config.discovery.clone();
    let discovery_handle = tokio::spawn(async move {
        if let Err(e) = ssdp::search::run_discovery(discovery_config, service_tx, discovery_cancel).await {
            tracing::error!("SSDP discovery error: {}", e);
        }
    });

    // Spawn hydrator task
    let hydrator = Hydrator::new(http, control.clone(), DeviceFilter::new(&config.filter));
    let hydrator_cancel = cancel.clone();
    let hydrator_registry = registry.clone();
    let hydrator_handle = tokio::spawn(async move {
        if let Err(e) = device::run_hydrator(hydrator, service_rx, hydrator_registry, hydrator_cancel).await {
            tracing::error!("Hydrator error: {}", e);
        }
    });

    // Spawn event listener task
    let events_cancel = cancel.clone();
    let events_registry = registry.clone();
    let events_control = control.clone();
    let events_handle = tokio::spawn(async move {
        if let Err(e) = listener.run(events_registry, events_control, events_cancel).await {
            tracing::error!("Event listener error: {}", e);
        }
    });

    // Spawn command dispatcher task
    let (command_tx, command_rx) = mpsc::channel(64);
    let commands_cancel = cancel.clone();
    let commands_snapshots = registry.subscribe();
    let commands_control = control.clone();
    let commands_handle = tokio::spawn(async move {
        if let Err(e) = commands::run_commands(command_rx, commands_snapshots, commands_control, commands_cancel).await {
            tracing::error!("Command dispatcher error: {}", e);
        }
    });

    // Build API router
    let app_state = api::routes::AppState {
        snapshots: registry.subscribe(),
        commands: command_tx,
        control,
    };
    let app = api::routes::router(app_state);

    // Bind HTTP server
    let api_listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}", config.api.listen);

    // Run server with graceful shutdown
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(api_listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    cancel.cancel();

    // Wait for all tasks to complete
    let _ = tokio::join!(
        discovery_handle,
        hydrator_handle,
        events_handle,
        commands_handle,
        server_handle
    );

    tracing::info!("Registry holds {} device(s)", registry.snapshot().devices.len());

    // Shutdown the registry engine
    if let Err(e) = registry.shutdown().await {
        tracing::error!("Failed to shutdown registry engine: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
