//! Reads the bridge's TOML file.
//!
//! A file is only accepted when it parses and its `[timing]` timeouts can be
//! met, so the config watcher never hands an unusable revision to the session.

use std::path::Path;

use eyre::WrapErr as _;
use tokio::fs;
use tracing::debug;

use crate::config::KumoConfig;

/// Reads, parses and validates the bridge config from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not valid TOML for
/// [`KumoConfig`] or sets a zero timeout.
pub async fn load<P: AsRef<Path>>(path: P) -> eyre::Result<KumoConfig> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .await
        .wrap_err(format!("Failed to read router config at: {}", path.display()))?;
    let config: KumoConfig = toml::from_str(&content)
        .wrap_err(format!("Invalid router config at: {}", path.display()))?;
    config
        .timing
        .validate()
        .wrap_err(format!("Invalid router config at: {}", path.display()))?;

    if config.device.ip.trim().is_empty() {
        debug!("[device] ip is empty, the bridge will stay disconnected");
    }
    Ok(config)
}
