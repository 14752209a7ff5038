//! Change notifications published to the host surface.

use core::fmt;

use serde::Serialize;

/// Connection lifecycle as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    ConnectionFailure,
    /// Connected, bulk sync in progress.
    Loading,
    /// Bulk sync finished, listening for events.
    Ready,
}

/// Coarse indicator level a host renders for a [`ConnectionStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Ok,
    Warning,
    Error,
    Unknown,
}

impl ConnectionStatus {
    #[must_use]
    pub const fn level(self) -> StatusLevel {
        match self {
            Self::Ready => StatusLevel::Ok,
            Self::Connecting | Self::Loading => StatusLevel::Warning,
            Self::ConnectionFailure => StatusLevel::Error,
            Self::Disconnected => StatusLevel::Unknown,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::ConnectionFailure => "connection failure",
            Self::Loading => "loading",
            Self::Ready => "ready",
        })
    }
}

/// What a display name belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NameKind {
    Destination,
    Source,
    Salvo,
}

/// Boolean feedbacks that depend on mirror state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    /// Does a given source feed a given destination.
    DestinationMatch,
    /// Is a destination the pre-selected one.
    ActiveDestination,
    /// Is a source the pre-selected one.
    ActiveSource,
}

/// A feedback with its options, ready to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Feedback {
    DestinationMatch { destination: u32, source: u32 },
    ActiveDestination { destination: u32 },
    ActiveSource { source: u32 },
}

/// Notification emitted by the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum BridgeEvent {
    StatusChanged(ConnectionStatus),
    RouteChanged { destination: u32, source: u32 },
    NameChanged { kind: NameKind, index: u32 },
    VariableChanged { name: String, value: String },
    FeedbackRecheck(FeedbackKind),
}
