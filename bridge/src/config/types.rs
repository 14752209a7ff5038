//! Configuration data types for the bridge.
//!
//! This module contains the router connection settings and the timing knobs
//! of the session engine.

use core::time::Duration;

use serde::Deserialize;
use thiserror::Error as ThisError;

/// Largest crosspoint size any KUMO model offers.
pub const MAX_PORTS: u32 = 64;

const DEFAULT_SOURCE_COUNT: u32 = 16;
const DEFAULT_DESTINATION_COUNT: u32 = 4;

/// Known KUMO models and their crosspoint sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum RouterModel {
    #[serde(rename = "1604")]
    Kumo1604,
    #[serde(rename = "1616")]
    Kumo1616,
    #[serde(rename = "3232")]
    Kumo3232,
    #[serde(rename = "6464")]
    Kumo6464,
}

impl RouterModel {
    /// `(sources, destinations)` of this model.
    #[must_use]
    pub const fn ports(self) -> (u32, u32) {
        match self {
            Self::Kumo1604 => (16, 4),
            Self::Kumo1616 => (16, 16),
            Self::Kumo3232 => (32, 32),
            Self::Kumo6464 => (64, 64),
        }
    }
}

/// Router connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
pub struct DeviceConfig {
    /// Address of the router, `host` or `host:port`. Empty disables the connection.
    #[serde(default)]
    pub ip: String,
    /// Model used to derive the port counts when they are not given explicitly.
    #[serde(default)]
    pub model: Option<RouterModel>,
    #[serde(default)]
    pub source_count: Option<u32>,
    #[serde(default)]
    pub destination_count: Option<u32>,
}

/// The part of the device settings that identifies a session.
/// Any change to it requires a reconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionIdentity {
    pub ip: String,
    pub source_count: u32,
    pub destination_count: u32,
}

impl DeviceConfig {
    fn model_ports(&self) -> (u32, u32) {
        self.model
            .map_or((DEFAULT_SOURCE_COUNT, DEFAULT_DESTINATION_COUNT), RouterModel::ports)
    }

    /// Number of sources, explicit count first, then model, capped at [`MAX_PORTS`].
    #[must_use]
    pub fn source_count(&self) -> u32 {
        self.source_count
            .unwrap_or_else(|| self.model_ports().0)
            .min(MAX_PORTS)
    }

    /// Number of destinations, explicit count first, then model, capped at [`MAX_PORTS`].
    #[must_use]
    pub fn destination_count(&self) -> u32 {
        self.destination_count
            .unwrap_or_else(|| self.model_ports().1)
            .min(MAX_PORTS)
    }

    #[must_use]
    pub fn identity(&self) -> ConnectionIdentity {
        ConnectionIdentity {
            ip: self.ip.trim().to_owned(),
            source_count: self.source_count(),
            destination_count: self.destination_count(),
        }
    }
}

/// Timing of the session engine. All values are milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Delay between consecutive bulk-sync fetches.
    pub stagger_interval_ms: u64,
    /// Delay before reconnecting after a failure.
    pub reconnect_delay_ms: u64,
    pub connect_timeout_ms: u64,
    /// Client-side timeout of a single bulk-sync fetch.
    pub fetch_timeout_ms: u64,
    /// Client-side timeout of one long-poll; must exceed the device's hold time.
    pub poll_timeout_ms: u64,
    /// Client-side timeout of a write issued by an action.
    pub action_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            stagger_interval_ms: 10,
            reconnect_delay_ms: 5000,
            connect_timeout_ms: 3000,
            fetch_timeout_ms: 5000,
            poll_timeout_ms: 90_000,
            action_timeout_ms: 5000,
        }
    }
}

impl TimingConfig {
    #[must_use]
    pub const fn stagger_interval(&self) -> Duration {
        Duration::from_millis(self.stagger_interval_ms)
    }

    #[must_use]
    pub const fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    #[must_use]
    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    #[must_use]
    pub const fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    #[must_use]
    pub const fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }

    /// Reject timeouts that would fail every request before it is sent.
    ///
    /// # Errors
    ///
    /// Returns the first `[timing]` key that is zero.
    pub fn validate(&self) -> Result<(), InvalidTiming> {
        [
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("fetch_timeout_ms", self.fetch_timeout_ms),
            ("poll_timeout_ms", self.poll_timeout_ms),
            ("action_timeout_ms", self.action_timeout_ms),
        ]
        .into_iter()
        .find(|&(_, value)| value == 0)
        .map_or(Ok(()), |(key, _)| Err(InvalidTiming { key }))
    }
}

/// A `[timing]` timeout that can never be met.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ThisError)]
#[error("[timing] {key} must be greater than zero")]
pub struct InvalidTiming {
    pub key: &'static str,
}

/// Root config structure of the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
pub struct KumoConfig {
    pub device: DeviceConfig,
    #[serde(default)]
    pub timing: TimingConfig,
}

impl KumoConfig {
    /// Whether switching from `self` to `other` needs a new session.
    #[must_use]
    pub fn requires_reconnect(&self, other: &Self) -> bool {
        self.device.identity() != other.device.identity()
    }
}
