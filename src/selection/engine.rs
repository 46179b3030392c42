//! Nearest-node selection
//!
//! Scans a registry snapshot and returns the active node with the smallest
//! haversine distance to the client. Equidistant nodes are resolved in favour
//! of the lexicographically smallest id, so the result does not depend on the
//! registry's iteration order.

use crate::domain::{Coordinates, Node};
use crate::error::{Error, Result};
use crate::registry::NodeRegistry;
use std::sync::Arc;
use tracing::debug;

/// The chosen node and its distance from the client
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub node: Node,
    pub distance_km: f64,
}

/// Computes nearest active nodes from registry snapshots
#[derive(Debug, Clone)]
pub struct SelectionEngine {
    registry: Arc<NodeRegistry>,
}

impl SelectionEngine {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self { registry }
    }

    /// Nearest active node to `(latitude, longitude)`
    pub fn nearest(&self, latitude: f64, longitude: f64) -> Result<Selection> {
        let snapshot = self.registry.snapshot();
        let selection = select_nearest(&snapshot, Coordinates::new(latitude, longitude))?;
        debug!(
            "Selected node {} at {:.3} km from ({}, {}) among {} entries",
            selection.node.id,
            selection.distance_km,
            latitude,
            longitude,
            snapshot.len()
        );
        Ok(selection)
    }
}

/// Nearest active node in `nodes` to `origin`
pub fn select_nearest(nodes: &[Node], origin: Coordinates) -> Result<Selection> {
    let mut best: Option<(&Node, f64)> = None;

    for node in nodes.iter().filter(|n| n.is_active()) {
        let distance = origin.distance_km(&node.coordinates());
        let closer = match best {
            None => true,
            Some((current, best_distance)) => {
                distance < best_distance || (distance == best_distance && node.id < current.id)
            }
        };
        if closer {
            best = Some((node, distance));
        }
    }

    best.map(|(node, distance_km)| Selection {
        node: node.clone(),
        distance_km,
    })
    .ok_or(Error::NoActiveNodes)
}
