//! User-triggered commands.
//!
//! Actions write straight to the router and never touch the mirror; the router
//! reports the resulting changes through the event stream like any other change.
//! Invalid requests are logged and rejected before anything is sent.

use kumo_common::{ParamId, SALVO_COUNT};
use thiserror::Error as ThisError;
use tracing::{error, info, warn};

use crate::{device::DeviceError, session::SessionManager};

/// Why an action was not carried out.
#[derive(Debug, ThisError)]
pub enum ActionError {
    #[error("{what} {index} is out of range 1..={max}")]
    OutOfRange {
        what: &'static str,
        index: u32,
        max: u32,
    },
    #[error("No destination selected")]
    NoDestinationSelected,
    #[error("Route of destination {0} is not known yet")]
    UnknownRoute(u32),
    #[error("No router address configured")]
    NoAddress,
    #[error("Router rejected the action")]
    Device(#[from] DeviceError),
}

fn check_range(what: &'static str, index: u32, max: u32) -> Result<(), ActionError> {
    if (1..=max).contains(&index) {
        Ok(())
    } else {
        Err(ActionError::OutOfRange { what, index, max })
    }
}

/// Log a rejected action at the level its cause deserves.
fn report(action: &'static str, result: Result<(), ActionError>) -> Result<(), ActionError> {
    match result {
        Err(ref e @ ActionError::Device(_)) => error!(action, ?e, "Action failed"),
        Err(ref e) => warn!(action, %e, "Action rejected"),
        Ok(()) => {}
    }
    result
}

impl SessionManager {
    fn check_destination(&self, destination: u32) -> Result<(), ActionError> {
        check_range(
            "Destination",
            destination,
            self.config().device.destination_count(),
        )
    }

    fn check_source(&self, source: u32) -> Result<(), ActionError> {
        check_range("Source", source, self.config().device.source_count())
    }

    async fn write(&self, param: ParamId, value: u32) -> Result<(), ActionError> {
        if self.config().device.ip.trim().is_empty() {
            return Err(ActionError::NoAddress);
        }
        let timeout = self.config().timing.action_timeout();
        self.device()?.set(param, value, timeout).await?;
        Ok(())
    }

    async fn write_route(&self, destination: u32, source: u32) -> Result<(), ActionError> {
        self.check_destination(destination)?;
        self.check_source(source)?;
        info!(destination, source, "Routing");
        self.write(ParamId::DestinationStatus(destination), source)
            .await
    }

    /// Route `source` to `destination`.
    ///
    /// # Errors
    ///
    /// Returns an error if an index is out of range or the router rejects the write.
    pub async fn route_source_to_destination(
        &self,
        destination: u32,
        source: u32,
    ) -> Result<(), ActionError> {
        report(
            "route",
            self.write_route(destination, source).await,
        )
    }

    /// Pre-select a destination for [`Self::send_source_to_selected_destination`].
    ///
    /// # Errors
    ///
    /// Returns an error if the destination is out of range.
    pub fn select_destination(&self, destination: u32) -> Result<(), ActionError> {
        report("select destination", self.check_destination(destination))?;
        self.mirror().select_destination(destination);
        Ok(())
    }

    /// Select `source` and route it to the pre-selected destination.
    ///
    /// The source stays selected even when no destination is.
    ///
    /// # Errors
    ///
    /// Returns an error if no destination is selected, the source is out of range
    /// or the router rejects the write.
    pub async fn send_source_to_selected_destination(&self, source: u32) -> Result<(), ActionError> {
        let result = async {
            self.check_source(source)?;
            self.mirror().select_source(source);
            let destination = self
                .selection()
                .destination
                .ok_or(ActionError::NoDestinationSelected)?;
            self.write_route(destination, source).await
        }
        .await;
        report("send source", result)
    }

    /// Fire a stored salvo.
    ///
    /// # Errors
    ///
    /// Returns an error if the salvo index is out of range or the router rejects the write.
    pub async fn take_salvo(&self, index: u32) -> Result<(), ActionError> {
        let result = async {
            check_range("Salvo", index, SALVO_COUNT)?;
            info!(index, "Taking salvo");
            self.write(ParamId::TakeSalvo, index).await
        }
        .await;
        report("take salvo", result)
    }

    /// Exchange the sources of two destinations.
    ///
    /// Both routes must be known from the mirror. The two writes are sent one after
    /// the other; if the second fails the first stays applied.
    ///
    /// # Errors
    ///
    /// Returns an error if an index is out of range, a route is unknown or the
    /// router rejects a write.
    pub async fn swap_destinations(&self, first: u32, second: u32) -> Result<(), ActionError> {
        let result = async {
            self.check_destination(first)?;
            self.check_destination(second)?;
            let first_source = self.route(first).ok_or(ActionError::UnknownRoute(first))?;
            let second_source = self
                .route(second)
                .ok_or(ActionError::UnknownRoute(second))?;
            info!(first, second, "Swapping destinations");
            self.write_route(first, second_source).await?;
            self.write_route(second, first_source).await
        }
        .await;
        report("swap", result)
    }
}
