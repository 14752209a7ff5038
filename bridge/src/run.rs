use core::time::Duration;
use std::path::Path;

use eyre::{Result, WrapErr as _, eyre};
use tokio::{signal, sync::broadcast::error::RecvError};
use tracing::{Instrument as _, debug, info, warn};

use crate::{
    config::{self, KumoConfig},
    events::BridgeEvent,
    session::SessionManager,
};

/// Resolves when SIGTERM or Ctrl-C is received.
pub(crate) async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .wrap_err("Failed to create SIGTERM signal handler")?;
        tokio::select! {
            _ = sigterm.recv() => {}
            res = signal::ctrl_c() => res.wrap_err("Failed to listen for Ctrl-C")?,
        }
    }
    #[cfg(not(unix))]
    {
        signal::ctrl_c()
            .await
            .wrap_err("Failed to listen for Ctrl-C")?;
    }
    Ok(())
}

async fn load_manager(config_path: &Path) -> Result<SessionManager> {
    let config = config::load(config_path).await?;
    SessionManager::new(config).wrap_err("Failed to set up the router client")
}

/// Upper bound for connect plus bulk sync with the given settings.
fn ready_deadline(config: &KumoConfig) -> Duration {
    let timing = &config.timing;
    let fetches = 3 * config.device.destination_count()
        + 2 * config.device.source_count()
        + kumo_common::SALVO_COUNT;
    timing.connect_timeout()
        + timing.stagger_interval().saturating_mul(fetches)
        + timing.fetch_timeout()
}

/// Connect and wait for the bulk sync to finish.
async fn connect_ready(manager: &SessionManager) -> Result<()> {
    manager.connect();
    let deadline = ready_deadline(&manager.config());
    if manager.wait_until_ready(deadline).await {
        Ok(())
    } else {
        Err(eyre!(
            "Router at {} did not become ready within {deadline:?}, status {}",
            manager.config().device.ip,
            manager.status()
        ))
    }
}

async fn log_events(manager: SessionManager) {
    let mut events = manager.subscribe();
    loop {
        match events.recv().await {
            Ok(BridgeEvent::StatusChanged(status)) => {
                info!(%status, level = ?status.level(), "Router status");
            }
            Ok(BridgeEvent::RouteChanged {
                destination,
                source,
            }) => info!(destination, source, "Route changed"),
            Ok(event) => debug!(?event, "Bridge event"),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event log fell behind"),
            Err(RecvError::Closed) => return,
        }
    }
}

/// Run the bridge until a shutdown signal arrives.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or signal handling fails.
pub(crate) async fn service(config_path: &Path) -> Result<()> {
    let manager = load_manager(config_path).await?;

    tokio::spawn(log_events(manager.clone()).in_current_span());
    let watcher = tokio::spawn(
        config::watch_config_file(config_path.to_path_buf(), manager.clone()).in_current_span(),
    );

    manager.connect();
    let res = shutdown_signal().await;
    info!("Received shutdown, shutting down");

    manager.teardown();
    watcher.abort();
    res
}

/// Print the synchronized router state as JSON.
///
/// # Errors
///
/// Returns an error if the router does not become ready.
pub(crate) async fn status(config_path: &Path) -> Result<()> {
    let manager = load_manager(config_path).await?;
    let res = connect_ready(&manager).await;
    manager.teardown();
    res?;

    let snapshot = serde_json::to_string_pretty(&manager.snapshot())
        .wrap_err("Failed to serialize router state")?;
    println!("{snapshot}");
    Ok(())
}

/// # Errors
///
/// Returns an error if the action is rejected.
pub(crate) async fn route(config_path: &Path, destination: u32, source: u32) -> Result<()> {
    let manager = load_manager(config_path).await?;
    manager
        .route_source_to_destination(destination, source)
        .await
        .wrap_err(format!("Failed to route source {source} to destination {destination}"))
}

/// # Errors
///
/// Returns an error if the action is rejected.
pub(crate) async fn salvo(config_path: &Path, index: u32) -> Result<()> {
    let manager = load_manager(config_path).await?;
    manager
        .take_salvo(index)
        .await
        .wrap_err(format!("Failed to take salvo {index}"))
}

/// Swap two destinations once their current routes are known.
///
/// # Errors
///
/// Returns an error if the router does not become ready or the swap is rejected.
pub(crate) async fn swap(config_path: &Path, first: u32, second: u32) -> Result<()> {
    let manager = load_manager(config_path).await?;
    let res = match connect_ready(&manager).await {
        Ok(()) => manager
            .swap_destinations(first, second)
            .await
            .wrap_err(format!("Failed to swap destinations {first} and {second}")),
        Err(e) => Err(e),
    };
    manager.teardown();
    res
}
