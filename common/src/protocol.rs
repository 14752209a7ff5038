//! Request grammar of the KUMO `/config` HTTP endpoint.
//!
//! Every request is a `GET /config?action=...&configid=0[&...]`. The bridge renders
//! [`Request`]s into query pairs; the fake device in the integration tests parses
//! them back with [`Request::from_query`].

use core::{fmt, str::FromStr};
use std::{collections::HashMap, sync::LazyLock};

use regex::Regex;
use thiserror::Error as ThisError;

/// The only config id the bridge ever addresses.
pub const CONFIG_ID: &str = "0";

/// Number of salvos a KUMO stores, independent of the router size.
pub const SALVO_COUNT: u32 = 8;

// Macro to define the enum from variant => string mappings
macro_rules! define_enum_with_str {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident => $str:literal
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                $variant,
            )*
        }

        impl $name {
            /// Wire representation of this value.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $str,)*
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ProtocolError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($str => Ok($name::$variant),)*
                    _ => Err(ProtocolError::UnknownAction(value.to_owned())),
                }
            }
        }
    };
}

define_enum_with_str! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// The `action` query parameter.
    pub enum Action {
        /// Open a session and obtain a connection id.
        Connect => "connect",
        /// Long-poll for parameter change events.
        WaitForConfigEvents => "wait_for_config_events",
        /// Read a single parameter.
        Get => "get",
        /// Write a single parameter.
        Set => "set",
    }
}

/// Errors produced while parsing protocol strings.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum ProtocolError {
    #[error("unknown parameter id: {0}")]
    UnknownParam(String),
    #[error("unknown action: {0}")]
    UnknownAction(String),
    #[error("missing query parameter: {0}")]
    MissingQuery(&'static str),
}

/// Which side of the crosspoint a name belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Port {
    Destination,
    Source,
}

impl Port {
    const fn wire_name(self) -> &'static str {
        match self {
            Self::Destination => "Destination",
            Self::Source => "Source",
        }
    }
}

/// Destinations and sources carry a two-line display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Line {
    First,
    Second,
}

impl Line {
    pub const BOTH: [Self; 2] = [Self::First, Self::Second];

    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::First => 1,
            Self::Second => 2,
        }
    }

    const fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(Self::First),
            2 => Some(Self::Second),
            _ => None,
        }
    }
}

/// A router parameter, rendered as e.g. `eParamID_XPT_Destination3_Status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamId {
    /// Source currently routed to a destination.
    DestinationStatus(u32),
    /// One line of a destination or source name.
    Name { port: Port, index: u32, line: Line },
    /// Salvo display name, nested under `.name` in the value.
    Salvo(u32),
    /// Write-only trigger; the written value is the salvo index.
    TakeSalvo,
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::DestinationStatus(index) => write!(f, "eParamID_XPT_Destination{index}_Status"),
            Self::Name { port, index, line } => write!(
                f,
                "eParamID_XPT_{}{index}_Line_{}",
                port.wire_name(),
                line.number()
            ),
            Self::Salvo(index) => write!(f, "eParamID_Salvo{index}"),
            Self::TakeSalvo => f.write_str("eParamID_TakeSalvo"),
        }
    }
}

static CROSSPOINT_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^eParamID_XPT_(Destination|Source)([0-9]{1,2})_(?:Status|Line_([12]))$")
        .unwrap_or_else(|e| unreachable!("crosspoint pattern is valid: {e}"))
});

static SALVO_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^eParamID_Salvo([0-9]{1,2})$")
        .unwrap_or_else(|e| unreachable!("salvo pattern is valid: {e}"))
});

impl FromStr for ParamId {
    type Err = ProtocolError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let unknown = || ProtocolError::UnknownParam(value.to_owned());

        if value == "eParamID_TakeSalvo" {
            return Ok(Self::TakeSalvo);
        }
        if let Some(caps) = SALVO_PARAM.captures(value) {
            let index = caps[1].parse().map_err(|_| unknown())?;
            return Ok(Self::Salvo(index));
        }
        let caps = CROSSPOINT_PARAM.captures(value).ok_or_else(unknown)?;
        let index: u32 = caps[2].parse().map_err(|_| unknown())?;
        let port = match &caps[1] {
            "Destination" => Port::Destination,
            _ => Port::Source,
        };
        match caps.get(3) {
            None if port == Port::Destination => Ok(Self::DestinationStatus(index)),
            None => Err(unknown()),
            Some(line) => {
                let line = line
                    .as_str()
                    .parse()
                    .ok()
                    .and_then(Line::from_number)
                    .ok_or_else(unknown)?;
                Ok(Self::Name { port, index, line })
            }
        }
    }
}

/// A single request against the `/config` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Connect,
    WaitForConfigEvents { connection_id: String },
    Get(ParamId),
    Set { param: ParamId, value: String },
}

impl Request {
    #[must_use]
    pub const fn action(&self) -> Action {
        match *self {
            Self::Connect => Action::Connect,
            Self::WaitForConfigEvents { .. } => Action::WaitForConfigEvents,
            Self::Get(_) => Action::Get,
            Self::Set { .. } => Action::Set,
        }
    }

    /// Query pairs in the order the device documents them.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("action", self.action().to_string()),
            ("configid", CONFIG_ID.to_owned()),
        ];
        match *self {
            Self::Connect => {}
            Self::WaitForConfigEvents { ref connection_id } => {
                pairs.push(("connectionid", connection_id.clone()));
            }
            Self::Get(param) => pairs.push(("paramid", param.to_string())),
            Self::Set { param, ref value } => {
                pairs.push(("paramid", param.to_string()));
                pairs.push(("value", value.clone()));
            }
        }
        pairs
    }

    /// Parse a request back from its decoded query string.
    ///
    /// # Errors
    ///
    /// Returns an error if the action or parameter id is unknown or a required pair is missing.
    pub fn from_query(query: &HashMap<String, String>) -> Result<Self, ProtocolError> {
        let get = |key: &'static str| {
            query
                .get(key)
                .map(String::as_str)
                .ok_or(ProtocolError::MissingQuery(key))
        };
        Ok(match get("action")?.parse()? {
            Action::Connect => Self::Connect,
            Action::WaitForConfigEvents => Self::WaitForConfigEvents {
                connection_id: get("connectionid")?.to_owned(),
            },
            Action::Get => Self::Get(get("paramid")?.parse()?),
            Action::Set => Self::Set {
                param: get("paramid")?.parse()?,
                value: get("value")?.to_owned(),
            },
        })
    }
}
