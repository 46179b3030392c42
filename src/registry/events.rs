//! Registry Events
//!
//! Events emitted by the node registry for external consumers (activity
//! logging, metrics) to react to registrations.

use crate::domain::Node;
use serde::{Deserialize, Serialize};

/// Events emitted by the node registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RegistryEvent {
    /// A node was accepted; `replaced` is set when it overwrote an entry
    NodeRegistered { node: Node, replaced: bool },

    /// A registration failed validation
    RegistrationRejected { reason: String },
}

impl RegistryEvent {
    /// Get the node ID associated with this event
    pub fn node_id(&self) -> Option<&str> {
        match self {
            RegistryEvent::NodeRegistered { node, .. } => Some(&node.id),
            RegistryEvent::RegistrationRejected { .. } => None,
        }
    }

    /// Short action label used in activity logs
    pub fn action(&self) -> &'static str {
        match self {
            RegistryEvent::NodeRegistered { replaced: false, .. } => "Node registered",
            RegistryEvent::NodeRegistered { replaced: true, .. } => "Node re-registered",
            RegistryEvent::RegistrationRejected { .. } => "Node registration rejected",
        }
    }
}
