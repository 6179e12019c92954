//! Shared data types for the registry, discovery and command layers.

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Surrogate key assigned by the registry. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub i64);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reachability as last confirmed by discovery or a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Unknown,
    Online,
    Offline,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Unknown => "unknown",
            DeviceStatus::Online => "online",
            DeviceStatus::Offline => "offline",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unknown" => Some(DeviceStatus::Unknown),
            "online" => Some(DeviceStatus::Online),
            "offline" => Some(DeviceStatus::Offline),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted registry entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub id: DeviceId,
    pub name: String,
    pub address: IpAddr,
    /// Hardware id learned from discovery; `None` until first correlated.
    pub reported_identity: Option<String>,
    pub model: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
    pub status: DeviceStatus,
    pub created_at: DateTime<Utc>,
}

/// Partial update applied by [`crate::storage::RegistryStore::update`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordUpdate {
    pub address: Option<IpAddr>,
    pub last_seen: Option<DateTime<Utc>>,
    pub status: Option<DeviceStatus>,
    pub reported_identity: Option<String>,
    pub model: Option<String>,
}

impl RecordUpdate {
    pub fn status(status: DeviceStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == RecordUpdate::default()
    }
}

/// One device answering one probe. Never persisted directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryObservation {
    pub address: IpAddr,
    pub reported_identity: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relay_on: Option<bool>,
}

/// Control commands understood by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PowerCommand {
    PowerOn,
    PowerOff,
    Refresh,
}

impl PowerCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerCommand::PowerOn => "power-on",
            PowerCommand::PowerOff => "power-off",
            PowerCommand::Refresh => "refresh",
        }
    }

    /// Whether the command changes physical device state.
    pub fn is_mutating(&self) -> bool {
        !matches!(self, PowerCommand::Refresh)
    }
}

impl fmt::Display for PowerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device acknowledgement of a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ack {
    pub address: IpAddr,
    pub command: PowerCommand,
    pub relay_on: Option<bool>,
    pub reported_identity: Option<String>,
}

/// How the user refers to a device: by numeric id or by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Id(DeviceId),
    Name(String),
}

impl Identity {
    /// All-digit input is an id; anything else is a name. Registry names are
    /// never purely numeric, so this is unambiguous.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(id) = trimmed.parse::<i64>() {
                return Identity::Id(DeviceId(id));
            }
        }
        Identity::Name(trimmed.to_string())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Id(id) => write!(f, "#{}", id),
            Identity::Name(name) => write!(f, "'{}'", name),
        }
    }
}
