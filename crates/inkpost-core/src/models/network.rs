//! Network connectivity snapshot

use serde::{Deserialize, Serialize};
use std::fmt;

/// Physical transport reported by the platform
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Wifi,
    Cellular,
    Ethernet,
    None,
    #[default]
    Unknown,
}

impl ConnectionType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Wifi => "wifi",
            Self::Cellular => "cellular",
            Self::Ethernet => "ethernet",
            Self::None => "none",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time connectivity snapshot.
///
/// `is_internet_reachable` is `None` while the platform has not finished its
/// reachability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkState {
    pub is_connected: bool,
    pub is_internet_reachable: Option<bool>,
    #[serde(rename = "type")]
    pub connection_type: ConnectionType,
}

impl NetworkState {
    /// Connected with confirmed internet reachability.
    pub const fn online(connection_type: ConnectionType) -> Self {
        Self {
            is_connected: true,
            is_internet_reachable: Some(true),
            connection_type,
        }
    }

    /// No connection at all.
    pub const fn offline() -> Self {
        Self {
            is_connected: false,
            is_internet_reachable: Some(false),
            connection_type: ConnectionType::None,
        }
    }

    /// Nothing reported yet.
    pub const fn unknown() -> Self {
        Self {
            is_connected: false,
            is_internet_reachable: None,
            connection_type: ConnectionType::Unknown,
        }
    }

    /// Offline when disconnected or when reachability is known to be false.
    ///
    /// An unknown reachability on a connected link counts as online.
    pub const fn is_offline(&self) -> bool {
        !self.is_connected || matches!(self.is_internet_reachable, Some(false))
    }
}

impl Default for NetworkState {
    fn default() -> Self {
        Self::unknown()
    }
}
