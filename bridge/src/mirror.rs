//! In-memory mirror of router state.
//!
//! The mirror is a single [`watch`] value. Device-facing updates carry the session
//! generation they were fetched under and are rejected atomically when that
//! generation is no longer current. Updates that change nothing publish nothing.

use alloc::collections::BTreeMap;

use kumo_common::{Line, Port};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::events::{BridgeEvent, Feedback, FeedbackKind, NameKind};

/// Session generation counter.
pub type Generation = u64;

/// Value of the selection variables until the user picks something.
pub const NOT_SELECTED: &str = "Not yet selected";

const EVENT_CAPACITY: usize = 1024;

/// User pre-selection. Not device state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Selection {
    pub destination: Option<u32>,
    pub source: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct NameLines {
    first: Option<String>,
    second: Option<String>,
}

impl NameLines {
    fn slot(&mut self, line: Line) -> &mut Option<String> {
        match line {
            Line::First => &mut self.first,
            Line::Second => &mut self.second,
        }
    }

    fn lines(&self) -> Vec<String> {
        [&self.first, &self.second]
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }

    /// `"{index}\n{line1}\n{line2}"` once both lines are known; empty lines are left out.
    fn label(&self, index: u32) -> Option<String> {
        let (Some(first), Some(second)) = (&self.first, &self.second) else {
            return None;
        };
        let mut label = index.to_string();
        for line in [first, second] {
            if !line.is_empty() {
                label.push('\n');
                label.push_str(line);
            }
        }
        Some(label)
    }
}

const fn port_kind(port: Port) -> NameKind {
    match port {
        Port::Destination => NameKind::Destination,
        Port::Source => NameKind::Source,
    }
}

fn label_variable(port: Port, index: u32) -> String {
    match port {
        Port::Destination => format!("destination_label_{index}"),
        Port::Source => format!("source_label_{index}"),
    }
}

/// Snapshot of everything the router reported plus the user selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterState {
    generation: Generation,
    routes: BTreeMap<u32, u32>,
    names: BTreeMap<(Port, u32), NameLines>,
    salvos: BTreeMap<u32, String>,
    selection: Selection,
    variables: BTreeMap<String, String>,
}

impl Default for RouterState {
    fn default() -> Self {
        let variables = [("destination", NOT_SELECTED), ("source", NOT_SELECTED)]
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Self {
            generation: 0,
            routes: BTreeMap::new(),
            names: BTreeMap::new(),
            salvos: BTreeMap::new(),
            selection: Selection::default(),
            variables,
        }
    }
}

impl RouterState {
    #[must_use]
    pub const fn generation(&self) -> Generation {
        self.generation
    }

    #[must_use]
    pub fn route(&self, destination: u32) -> Option<u32> {
        self.routes.get(&destination).copied()
    }

    /// Known name lines of an entry; empty when nothing was reported yet.
    #[must_use]
    pub fn name(&self, kind: NameKind, index: u32) -> Vec<String> {
        let port = match kind {
            NameKind::Destination => Port::Destination,
            NameKind::Source => Port::Source,
            NameKind::Salvo => return self.salvos.get(&index).cloned().into_iter().collect(),
        };
        self.names
            .get(&(port, index))
            .map(NameLines::lines)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn salvo_name(&self, index: u32) -> Option<&str> {
        self.salvos.get(&index).map(String::as_str)
    }

    #[must_use]
    pub const fn selection(&self) -> Selection {
        self.selection
    }

    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn evaluate(&self, feedback: Feedback) -> bool {
        match feedback {
            Feedback::DestinationMatch {
                destination,
                source,
            } => self.route(destination) == Some(source),
            Feedback::ActiveDestination { destination } => {
                self.selection.destination == Some(destination)
            }
            Feedback::ActiveSource { source } => self.selection.source == Some(source),
        }
    }

    fn set_variable(&mut self, name: String, value: String, out: &mut Vec<BridgeEvent>) {
        if self.variables.get(&name) == Some(&value) {
            return;
        }
        self.variables.insert(name.clone(), value.clone());
        out.push(BridgeEvent::VariableChanged { name, value });
    }

    fn apply_route(&mut self, destination: u32, source: u32, out: &mut Vec<BridgeEvent>) {
        if self.routes.get(&destination) == Some(&source) {
            return;
        }
        self.routes.insert(destination, source);
        out.push(BridgeEvent::RouteChanged {
            destination,
            source,
        });
        self.set_variable(
            format!("destination_{destination}"),
            source.to_string(),
            out,
        );
        out.push(BridgeEvent::FeedbackRecheck(FeedbackKind::DestinationMatch));
    }

    fn apply_name(
        &mut self,
        port: Port,
        index: u32,
        line: Line,
        value: &str,
        out: &mut Vec<BridgeEvent>,
    ) {
        let entry = self.names.entry((port, index)).or_default();
        let slot = entry.slot(line);
        if slot.as_deref() == Some(value) {
            return;
        }
        *slot = Some(value.to_owned());
        let label = entry.label(index);
        out.push(BridgeEvent::NameChanged {
            kind: port_kind(port),
            index,
        });
        if let Some(label) = label {
            self.set_variable(label_variable(port, index), label, out);
        }
    }

    fn apply_salvo_name(&mut self, index: u32, value: &str, out: &mut Vec<BridgeEvent>) {
        if self.salvos.get(&index).map(String::as_str) == Some(value) {
            return;
        }
        self.salvos.insert(index, value.to_owned());
        out.push(BridgeEvent::NameChanged {
            kind: NameKind::Salvo,
            index,
        });
        self.set_variable(format!("salvo_{index}"), value.to_owned(), out);
    }

    /// Drop everything the router reported. Selection survives.
    fn reset_device_state(&mut self) {
        self.routes.clear();
        self.names.clear();
        self.salvos.clear();
        self.variables
            .retain(|name, _| name == "destination" || name == "source");
    }
}

/// Serializable view of the mirror, used by the `status` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouterSnapshot {
    pub generation: Generation,
    pub routes: BTreeMap<u32, u32>,
    pub destinations: BTreeMap<u32, Vec<String>>,
    pub sources: BTreeMap<u32, Vec<String>>,
    pub salvos: BTreeMap<u32, String>,
    pub selection: Selection,
}

/// Shared handle to the mirror and its notification channel.
#[derive(Debug, Clone)]
pub struct StateMirror {
    state: watch::Sender<RouterState>,
    events: broadcast::Sender<BridgeEvent>,
}

impl Default for StateMirror {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMirror {
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: watch::Sender::new(RouterState::default()),
            events,
        }
    }

    /// Run `f` against the state if `generation` is current (or not given) and
    /// publish the events it produced. Returns whether anything changed.
    fn update<F>(&self, generation: Option<Generation>, f: F) -> bool
    where
        F: FnOnce(&mut RouterState, &mut Vec<BridgeEvent>),
    {
        let mut events = Vec::new();
        let mut stale = false;
        self.state.send_if_modified(|state| {
            if let Some(generation) = generation
                && state.generation != generation
            {
                stale = true;
                return false;
            }
            f(state, &mut events);
            !events.is_empty()
        });
        if stale {
            debug!(?generation, "Dropping update from stale session");
        }
        let changed = !events.is_empty();
        for event in events {
            self.publish(event);
        }
        changed
    }

    pub(crate) fn publish(&self, event: BridgeEvent) {
        // Sending only fails without subscribers.
        drop(self.events.send(event));
    }

    /// Start a new generation with an empty device view.
    pub(crate) fn begin_generation(&self, generation: Generation) {
        self.state.send_modify(|state| {
            state.generation = generation;
            state.reset_device_state();
        });
    }

    /// Move to `generation` without touching the data, so late writes of the old one are rejected.
    pub(crate) fn invalidate(&self, generation: Generation) {
        self.state.send_modify(|state| state.generation = generation);
    }

    /// Record that `destination` is fed by `source`.
    pub fn set_route(&self, generation: Generation, destination: u32, source: u32) -> bool {
        self.update(Some(generation), |state, out| {
            state.apply_route(destination, source, out);
        })
    }

    /// Record one name line of a destination or source.
    pub fn set_name(
        &self,
        generation: Generation,
        port: Port,
        index: u32,
        line: Line,
        value: &str,
    ) -> bool {
        self.update(Some(generation), |state, out| {
            state.apply_name(port, index, line, value, out);
        })
    }

    pub fn set_salvo_name(&self, generation: Generation, index: u32, value: &str) -> bool {
        self.update(Some(generation), |state, out| {
            state.apply_salvo_name(index, value, out);
        })
    }

    pub fn select_destination(&self, destination: u32) {
        self.update(None, |state, out| {
            state.selection.destination = Some(destination);
            state.set_variable("destination".to_owned(), destination.to_string(), out);
            out.push(BridgeEvent::FeedbackRecheck(FeedbackKind::ActiveDestination));
        });
    }

    pub fn select_source(&self, source: u32) {
        self.update(None, |state, out| {
            state.selection.source = Some(source);
            state.set_variable("source".to_owned(), source.to_string(), out);
            out.push(BridgeEvent::FeedbackRecheck(FeedbackKind::ActiveSource));
        });
    }

    /// Borrow the current state. Do not hold the guard across an await.
    pub fn borrow(&self) -> watch::Ref<'_, RouterState> {
        self.state.borrow()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> RouterSnapshot {
        let state = self.state.borrow();
        let names_of = |port: Port| {
            state
                .names
                .iter()
                .filter(|&(&(p, _), _)| p == port)
                .map(|(&(_, index), lines)| (index, lines.lines()))
                .collect()
        };
        RouterSnapshot {
            generation: state.generation,
            routes: state.routes.clone(),
            destinations: names_of(Port::Destination),
            sources: names_of(Port::Source),
            salvos: state.salvos.clone(),
            selection: state.selection,
        }
    }
}
