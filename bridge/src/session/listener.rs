//! Long-poll event listener.
//!
//! The router holds `wait_for_config_events` open until something changes. The
//! listener applies the returned events and re-issues the poll right away, so
//! there is never more than one outstanding poll per session.

use kumo_common::{ConfigEvent, Line, ParamId, Port, SALVO_COUNT};
use tracing::{debug, trace};

use super::{SessionContext, SessionError};
use crate::{
    config::DeviceConfig,
    mirror::{Generation, StateMirror},
};

/// A validated change carried by one event.
enum Update<'ev> {
    Route { destination: u32, source: u32 },
    Name { port: Port, index: u32, line: Line, text: &'ev str },
    Salvo { index: u32, text: &'ev str },
}

fn port_count(device: &DeviceConfig, port: Port) -> u32 {
    match port {
        Port::Destination => device.destination_count(),
        Port::Source => device.source_count(),
    }
}

/// Check one event against the crosspoint. `Ok(None)` for parameters the bridge does not track.
fn validate<'ev>(
    device: &DeviceConfig,
    event: &'ev ConfigEvent,
) -> Result<Option<Update<'ev>>, SessionError> {
    let Some(param) = event.param() else {
        trace!(?event, "Ignoring untracked event");
        return Ok(None);
    };
    let in_range = |index: u32, max: u32| (1..=max).contains(&index);
    let update = match (param, event.int_value, event.str_value.as_deref()) {
        (ParamId::DestinationStatus(destination), Some(source), _) => {
            u32::try_from(source).ok().and_then(|source| {
                (in_range(destination, device.destination_count())
                    && in_range(source, device.source_count()))
                .then_some(Update::Route {
                    destination,
                    source,
                })
            })
        }
        (ParamId::Name { port, index, line }, _, Some(text)) => in_range(
            index,
            port_count(device, port),
        )
        .then_some(Update::Name {
            port,
            index,
            line,
            text,
        }),
        (ParamId::Salvo(index), _, Some(text)) => {
            in_range(index, SALVO_COUNT).then_some(Update::Salvo { index, text })
        }
        (ParamId::TakeSalvo, ..) => return Ok(None),
        _ => None,
    };
    update
        .map(Some)
        .ok_or_else(|| SessionError::MalformedEvent(event.clone()))
}

/// Apply one batch of events, all or nothing. Returns how many events touched
/// tracked parameters.
///
/// # Errors
///
/// Returns [`SessionError::MalformedEvent`] without touching the mirror if a
/// tracked parameter carries a missing value or an index outside the crosspoint.
pub(crate) fn apply_events(
    mirror: &StateMirror,
    generation: Generation,
    device: &DeviceConfig,
    events: &[ConfigEvent],
) -> Result<usize, SessionError> {
    let mut updates = Vec::with_capacity(events.len());
    for event in events {
        if let Some(update) = validate(device, event)? {
            updates.push(update);
        }
    }
    for update in &updates {
        match *update {
            Update::Route {
                destination,
                source,
            } => mirror.set_route(generation, destination, source),
            Update::Name {
                port,
                index,
                line,
                text,
            } => mirror.set_name(generation, port, index, line, text),
            Update::Salvo { index, text } => mirror.set_salvo_name(generation, index, text),
        };
    }
    Ok(updates.len())
}

/// Poll for events until the session goes stale or a poll fails.
///
/// A failed poll ends the loop with [`SessionError::Listen`], an unusable batch
/// with [`SessionError::MalformedEvent`]; the connection id is presumed invalid
/// afterwards, so there is no retry in place.
pub(crate) async fn listen(ctx: &SessionContext) -> Result<(), SessionError> {
    let timeout = ctx.config.timing.poll_timeout();
    loop {
        if !ctx.is_current() {
            return Err(SessionError::Stale);
        }
        let events = tokio::select! {
            () = ctx.token.cancelled() => return Err(SessionError::Stale),
            res = ctx.device.wait_for_events(&ctx.connection_id, timeout) => {
                res.map_err(SessionError::Listen)?
            }
        };
        // The session may have been replaced while the poll was held open.
        if !ctx.is_current() {
            debug!("Discarding events for a replaced session");
            return Err(SessionError::Stale);
        }
        let applied = apply_events(&ctx.mirror, ctx.generation, &ctx.config.device, &events)?;
        debug!(received = events.len(), applied, "Processed router events");
    }
}
