//! Configuration file watching and reloading utilities.
//!
//! This module monitors the configuration file and hands every successfully
//! parsed revision to the session manager.

use std::{
    fs,
    path::{Path, PathBuf},
};

use eyre::{Result, WrapErr as _};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use tokio::sync::mpsc::unbounded_channel;
use tracing::{error, info, warn};

use crate::{config, session::SessionManager};

/// Reloads the configuration file and forwards it to the session manager.
///
/// Reconnect decisions are left to [`SessionManager::config_updated`]; this only
/// filters out edits that did not change anything.
async fn process_config_change(path: &Path, manager: &SessionManager) -> Result<()> {
    info!("Config file modified. Reloading...");
    let new_config = config::load(path)
        .await
        .wrap_err(format!("Failed to reload config at: {}", path.display()))?;

    if *manager.config() == new_config {
        info!("No changes detected in config.");
    } else {
        manager.config_updated(new_config);
    }
    Ok(())
}

fn is_config_event(event_path: &Path, path: &Path) -> bool {
    // Try exact match first
    if event_path == path {
        return true;
    }
    // Try canonicalized comparison (handles path format differences)
    if let (Ok(canonical_event), Ok(canonical_config)) =
        (fs::canonicalize(event_path), fs::canonicalize(path))
        && canonical_event == canonical_config
    {
        return true;
    }
    // Fallback to filename match (handles atomic writes where temp files are involved)
    event_path.file_name().is_some() && event_path.file_name() == path.file_name()
}

/// Watches a config file for modifications and applies every valid revision.
///
/// Returns when the watcher stops delivering events.
///
/// # Errors
///
/// Returns an error if the file watcher cannot be created or the config file has no parent directory.
pub async fn watch_config_file(path: PathBuf, manager: SessionManager) -> Result<()> {
    let (raw_tx, mut raw_rx) = unbounded_channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res| {
            if let Ok(event) = res
                && raw_tx.send(event).is_err()
            {
                error!("Failed to send event to config watcher channel");
            }
        },
        notify::Config::default(),
    )
    .wrap_err("Failed to create file watcher")?;

    let dir = path
        .parent()
        .ok_or_else(|| eyre::eyre!("Config file must have a parent directory"))?;
    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .wrap_err("Failed to watch config directory")?;

    while let Some(event) = raw_rx.recv().await {
        if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
            continue;
        }
        if event
            .paths
            .iter()
            .any(|event_path| is_config_event(event_path, &path))
            && let Err(e) = process_config_change(&path, &manager).await
        {
            // Half-written files show up here during editor saves; the next event retries.
            warn!(?e, "Ignoring config revision");
        }
    }
    Ok(())
}
