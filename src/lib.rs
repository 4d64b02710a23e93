pub mod actors;
pub mod alerts;
pub mod api;
pub mod config;
pub mod delivery;
pub mod history;
pub mod inbound;
pub mod monitors;
pub mod oplog;
pub mod ports;
pub mod storage;
pub mod telegram;
pub mod util;

use serde::{Deserialize, Serialize};

/// Reachability of a device as seen by the echo probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PingStatus {
    Unknown,
    Disabled,
    Online,
    Offline,
}

impl PingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PingStatus::Unknown => "unknown",
            PingStatus::Disabled => "disabled",
            PingStatus::Online => "online",
            PingStatus::Offline => "offline",
        }
    }

    /// Only observed states are recorded in the transition log.
    pub fn is_observation(&self) -> bool {
        matches!(self, PingStatus::Online | PingStatus::Offline)
    }
}

impl std::fmt::Display for PingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(PingStatus::Unknown),
            "disabled" => Ok(PingStatus::Disabled),
            "online" => Ok(PingStatus::Online),
            "offline" => Ok(PingStatus::Offline),
            other => Err(format!("invalid ping status '{other}'")),
        }
    }
}

/// State of a TCP port as seen by the connect probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortStatus {
    Unknown,
    Disabled,
    Open,
    Closed,
}

impl PortStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortStatus::Unknown => "unknown",
            PortStatus::Disabled => "disabled",
            PortStatus::Open => "open",
            PortStatus::Closed => "closed",
        }
    }
}

impl std::fmt::Display for PortStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PortStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(PortStatus::Unknown),
            "disabled" => Ok(PortStatus::Disabled),
            "open" => Ok(PortStatus::Open),
            "closed" => Ok(PortStatus::Closed),
            other => Err(format!("invalid port status '{other}'")),
        }
    }
}
