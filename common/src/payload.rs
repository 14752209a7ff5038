//! JSON bodies returned by the `/config` endpoint.

use core::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::protocol::ParamId;

/// Body of `action=connect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectResponse {
    /// Opaque session token. Firmware versions differ in sending it as number or string.
    #[serde(deserialize_with = "token_as_string")]
    pub connectionid: String,
}

fn token_as_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawToken {
        Number(u64),
        Text(String),
    }

    Ok(match RawToken::deserialize(deserializer)? {
        RawToken::Number(n) => n.to_string(),
        RawToken::Text(s) => s,
    })
}

/// Body of `action=get`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamResponse {
    pub value: ParamValue,
}

/// A parameter value. Routes come back as integers (or numeric strings), name lines
/// as strings and salvos as an object with a `name` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Integer(i64),
    Text(String),
    Named { name: String },
}

impl ParamValue {
    /// Interpret the value as a 1-based port index. Zero is not an index.
    #[must_use]
    pub fn as_index(&self) -> Option<u32> {
        let index = match *self {
            Self::Integer(n) => u32::try_from(n).ok(),
            Self::Text(ref s) => s.trim().parse().ok(),
            Self::Named { .. } => None,
        };
        index.filter(|&i| i > 0)
    }

    /// Interpret the value as a display line.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match *self {
            Self::Text(ref s) => Some(s),
            Self::Integer(_) | Self::Named { .. } => None,
        }
    }

    /// Interpret the value as a salvo name; plain strings are accepted too.
    #[must_use]
    pub fn as_salvo_name(&self) -> Option<&str> {
        match *self {
            Self::Named { ref name } => Some(name),
            Self::Text(ref s) => Some(s),
            Self::Integer(_) => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Integer(n) => write!(f, "{n}"),
            Self::Text(ref s) => write!(f, "{s:?}"),
            Self::Named { ref name } => write!(f, "{{name: {name:?}}}"),
        }
    }
}

/// One entry of the `wait_for_config_events` array.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfigEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub int_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub str_value: Option<String>,
}

impl ConfigEvent {
    /// The parsed parameter, or `None` for events the bridge does not track.
    #[must_use]
    pub fn param(&self) -> Option<ParamId> {
        self.param_id.as_deref()?.parse().ok()
    }
}
