//! Library entry for the `kumo_bridge` crate.
//!
//! Exposes the session engine for embedding and `inner_main` so the shim binary
//! can run the command-line interface.
#![cfg_attr(
    test,
    expect(clippy::indexing_slicing, reason = "This is not problematic in tests",)
)]

extern crate alloc;
extern crate core;

pub mod actions;
pub mod cli;
pub mod config;
pub mod device;
pub mod events;
pub mod mirror;
mod run;
pub mod session;

use std::sync::Once;

use eyre::Result;
use tracing::{Instrument as _, info};
use tracing_subscriber::{EnvFilter, fmt::time::ChronoLocal};

use cli::{Cli, Command, ConfigArgs, LogFormat};

pub use actions::ActionError;
pub use config::KumoConfig;
pub use events::{BridgeEvent, ConnectionStatus, Feedback, FeedbackKind, NameKind};
pub use session::SessionManager;

static INIT_TRACING: Once = Once::new();

fn init_tracing(log_format: LogFormat) {
    INIT_TRACING.call_once(move || {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_timer(ChronoLocal::rfc_3339())
            .with_writer(std::io::stderr);

        match log_format {
            LogFormat::Compact => builder.compact().init(),
            LogFormat::Json => builder.json().init(),
            LogFormat::Pretty => builder.pretty().init(),
        }
    });
}

/// The bridge's main function; called from the shim binary.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or the command fails.
pub async fn inner_main(invocation: Cli) -> Result<()> {
    let ConfigArgs { config, log_format } = match invocation.command {
        Command::Service(ref args)
        | Command::Status(ref args)
        | Command::Route { config: ref args, .. }
        | Command::Salvo { config: ref args, .. }
        | Command::Swap { config: ref args, .. } => args.clone(),
    };
    init_tracing(log_format);

    let span = tracing::info_span!("kumo.startup", config = ?config, version = env!("CARGO_PKG_VERSION"));

    async move {
        match invocation.command {
            Command::Service(_) => {
                info!("Starting bridge service");
                run::service(&config).await
            }
            Command::Status(_) => run::status(&config).await,
            Command::Route {
                destination,
                source,
                ..
            } => run::route(&config, destination, source).await,
            Command::Salvo { salvo, .. } => run::salvo(&config, salvo).await,
            Command::Swap {
                destination_a,
                destination_b,
                ..
            } => run::swap(&config, destination_a, destination_b).await,
        }
    }
    .instrument(span)
    .await
}
