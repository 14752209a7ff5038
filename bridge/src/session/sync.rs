//! Bulk status synchronization after connect.
//!
//! Every route, name line and salvo name is read with its own request. Requests
//! are dispatched in plan order, each delayed by its position times the stagger
//! interval, because KUMO units stop answering when all of them arrive at once.

use core::time::Duration;

use futures::future;
use kumo_common::{Line, ParamId, ParamValue, Port, SALVO_COUNT};
use tokio::time::sleep;
use tracing::{debug, info};

use super::{SessionContext, SessionError};
use crate::device::DeviceError;

/// One parameter read of the bulk sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fetch {
    Route { destination: u32 },
    Name { port: Port, index: u32, line: Line },
    SalvoName { index: u32 },
}

impl Fetch {
    pub(crate) const fn param(self) -> ParamId {
        match self {
            Self::Route { destination } => ParamId::DestinationStatus(destination),
            Self::Name { port, index, line } => ParamId::Name { port, index, line },
            Self::SalvoName { index } => ParamId::Salvo(index),
        }
    }
}

/// Ordered fetch list: per destination its route and both name lines, then both
/// name lines per source, then every salvo name.
pub(crate) fn fetch_plan(destinations: u32, sources: u32) -> Vec<Fetch> {
    let mut plan = Vec::new();
    for destination in 1..=destinations {
        plan.push(Fetch::Route { destination });
        plan.extend(Line::BOTH.map(|line| Fetch::Name {
            port: Port::Destination,
            index: destination,
            line,
        }));
    }
    for source in 1..=sources {
        plan.extend(Line::BOTH.map(|line| Fetch::Name {
            port: Port::Source,
            index: source,
            line,
        }));
    }
    plan.extend((1..=SALVO_COUNT).map(|index| Fetch::SalvoName { index }));
    plan
}

/// Delay before dispatching the fetch at `position`.
fn dispatch_delay(interval: Duration, position: usize) -> Duration {
    interval.saturating_mul(u32::try_from(position).unwrap_or(u32::MAX))
}

fn unexpected(param: ParamId, value: ParamValue) -> SessionError {
    SessionError::Fetch {
        param,
        source: DeviceError::UnexpectedValue { param, value },
    }
}

/// Source of a route reading, if it names one of the router's `sources`.
fn routed_source(value: &ParamValue, sources: u32) -> Option<u32> {
    value.as_index().filter(|&source| source <= sources)
}

/// Apply a fetched value to the mirror. Stale generations are dropped by the mirror itself.
fn apply(ctx: &SessionContext, fetch: Fetch, value: ParamValue) -> Result<(), SessionError> {
    let param = fetch.param();
    match fetch {
        Fetch::Route { destination } => {
            let source = routed_source(&value, ctx.config.device.source_count())
                .ok_or_else(|| unexpected(param, value.clone()))?;
            ctx.mirror.set_route(ctx.generation, destination, source);
        }
        Fetch::Name { port, index, line } => {
            let text = value.as_text().ok_or_else(|| unexpected(param, value.clone()))?;
            ctx.mirror.set_name(ctx.generation, port, index, line, text);
        }
        Fetch::SalvoName { index } => {
            let name = value
                .as_salvo_name()
                .ok_or_else(|| unexpected(param, value.clone()))?;
            ctx.mirror.set_salvo_name(ctx.generation, index, name);
        }
    }
    Ok(())
}

/// Wait out the dispatch delay, then read one parameter unless the session went stale meanwhile.
async fn run_fetch(ctx: &SessionContext, fetch: Fetch, delay: Duration) -> Result<(), SessionError> {
    tokio::select! {
        () = ctx.token.cancelled() => return Err(SessionError::Stale),
        () = sleep(delay) => {}
    }
    if !ctx.is_current() {
        return Err(SessionError::Stale);
    }

    let param = fetch.param();
    let value = tokio::select! {
        () = ctx.token.cancelled() => return Err(SessionError::Stale),
        res = ctx.device.get(param, ctx.config.timing.fetch_timeout()) => {
            res.map_err(|source| SessionError::Fetch { param, source })?
        }
    };
    debug!(%param, %value, "Fetched");
    apply(ctx, fetch, value)
}

/// Populate the mirror for the whole crosspoint.
///
/// Succeeds only when every fetch succeeded; the first failure cancels the rest.
pub(crate) async fn synchronize(ctx: &SessionContext) -> Result<(), SessionError> {
    let plan = fetch_plan(
        ctx.config.device.destination_count(),
        ctx.config.device.source_count(),
    );
    let interval = ctx.config.timing.stagger_interval();
    info!(fetches = plan.len(), ?interval, "Synchronizing router state");

    let fetches = plan
        .into_iter()
        .enumerate()
        .map(|(position, fetch)| run_fetch(ctx, fetch, dispatch_delay(interval, position)));
    future::try_join_all(fetches).await?;
    Ok(())
}
