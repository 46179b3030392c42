//! Node record exchanged between worker nodes and the directory
//!
//! Field names are the wire contract of `POST /register-node`.

use crate::domain::geo::Coordinates;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Path every node exposes for notifications and generic payloads
pub const RECEIVE_PATH: &str = "/receive";

// =============================================================================
// Node Status
// =============================================================================

/// Lifecycle status advertised by a node
///
/// Workers only ever advertise `active`. Anything else a caller sends is kept
/// verbatim so it round-trips, but is never selectable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeStatus {
    Active,
    Inactive,
    #[default]
    Unknown,
    Other(String),
}

impl NodeStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, NodeStatus::Active)
    }

    pub fn as_str(&self) -> &str {
        match self {
            NodeStatus::Active => "active",
            NodeStatus::Inactive => "inactive",
            NodeStatus::Unknown => "",
            NodeStatus::Other(s) => s,
        }
    }
}

impl From<String> for NodeStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "active" => NodeStatus::Active,
            "inactive" => NodeStatus::Inactive,
            "" => NodeStatus::Unknown,
            _ => NodeStatus::Other(s),
        }
    }
}

impl From<&str> for NodeStatus {
    fn from(s: &str) -> Self {
        NodeStatus::from(s.to_string())
    }
}

impl From<NodeStatus> for String {
    fn from(status: NodeStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Node
// =============================================================================

/// A worker node as registered with the directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Opaque identifier generated by the node itself
    #[serde(default)]
    pub id: String,
    /// Bare host or full URL (possibly a tunnel) reachable by the directory
    #[serde(default, alias = "ip_address")]
    pub address: String,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    #[serde(default)]
    pub status: NodeStatus,
    /// Used only when `address` is a bare host
    #[serde(default)]
    pub port: String,
}

impl Node {
    /// Create an active node
    pub fn active(
        id: impl Into<String>,
        address: impl Into<String>,
        port: impl Into<String>,
        coordinates: Coordinates,
    ) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            latitude: coordinates.latitude,
            longitude: coordinates.longitude,
            status: NodeStatus::Active,
            port: port.into(),
        }
    }

    /// Check the fields the registry requires
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::Validation("node id must not be empty".into()));
        }
        if self.address.is_empty() {
            return Err(Error::Validation("node address must not be empty".into()));
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }

    /// Base URL of the node
    ///
    /// A URL address (tunnel) is used as-is; a bare host is combined with
    /// `port` over plain HTTP.
    pub fn base_url(&self) -> String {
        let address = self.address.trim().trim_end_matches('/');
        if address.contains("://") {
            address.to_string()
        } else if self.port.trim().is_empty() {
            format!("http://{}", address)
        } else {
            format!("http://{}:{}", address, self.port.trim())
        }
    }

    /// URL of the node's receive endpoint
    pub fn receive_url(&self) -> String {
        format!("{}{}", self.base_url(), RECEIVE_PATH)
    }
}
