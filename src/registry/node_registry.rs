//! Node Registry
//!
//! In-memory registry of worker nodes keyed by node id. A single exclusive
//! lock covers both the insert path and the snapshot scan, so every snapshot
//! is a consistent point-in-time copy. Critical sections are one insert or one
//! linear clone of the current entries.

use crate::domain::Node;
use crate::error::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

use super::RegistryEvent;

/// Capacity of the registry event channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

// =============================================================================
// Node ID
// =============================================================================

/// Unique identifier for a node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&String> for NodeId {
    fn from(s: &String) -> Self {
        Self(s.clone())
    }
}

// =============================================================================
// Registry Statistics
// =============================================================================

/// Counters maintained by the registry
#[derive(Debug, Default)]
pub struct RegistryStats {
    /// Accepted registrations, including overwrites
    pub registrations: AtomicU64,
    /// Registrations that replaced an existing entry
    pub overwrites: AtomicU64,
    /// Registrations rejected by validation
    pub rejections: AtomicU64,
}

impl RegistryStats {
    /// Create a snapshot of current stats
    pub fn snapshot(&self, total_nodes: usize) -> RegistryStatsSnapshot {
        RegistryStatsSnapshot {
            total_nodes: total_nodes as u64,
            registrations: self.registrations.load(Ordering::Relaxed),
            overwrites: self.overwrites.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of registry statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStatsSnapshot {
    pub total_nodes: u64,
    pub registrations: u64,
    pub overwrites: u64,
    pub rejections: u64,
}

// =============================================================================
// Node Registry
// =============================================================================

/// Concurrency-safe store of registered nodes
///
/// Entries are created on first registration, replaced wholesale on
/// re-registration and never removed.
pub struct NodeRegistry {
    nodes: Mutex<HashMap<NodeId, Node>>,
    stats: RegistryStats,
    event_sender: broadcast::Sender<RegistryEvent>,
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("node_count", &self.len())
            .finish()
    }
}

impl NodeRegistry {
    /// Create an empty registry
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Get an event receiver
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_sender.subscribe()
    }

    /// Insert or replace a node (last write wins)
    pub fn register(&self, node: Node) -> Result<()> {
        if let Err(e) = node.validate() {
            self.stats.rejections.fetch_add(1, Ordering::Relaxed);
            let _ = self.event_sender.send(RegistryEvent::RegistrationRejected {
                reason: e.to_string(),
            });
            return Err(e);
        }

        let node_id = NodeId::from(&node.id);
        let event_node = node.clone();

        let replaced = {
            let mut nodes = self.nodes.lock();
            nodes.insert(node_id, node).is_some()
        };

        self.stats.registrations.fetch_add(1, Ordering::Relaxed);
        if replaced {
            self.stats.overwrites.fetch_add(1, Ordering::Relaxed);
        }

        let _ = self.event_sender.send(RegistryEvent::NodeRegistered {
            node: event_node,
            replaced,
        });

        Ok(())
    }

    /// Consistent point-in-time copy of all entries, in no particular order
    pub fn snapshot(&self) -> Vec<Node> {
        self.nodes.lock().values().cloned().collect()
    }

    /// Get a node by ID
    pub fn get(&self, node_id: impl Into<NodeId>) -> Option<Node> {
        let node_id = node_id.into();
        self.nodes.lock().get(&node_id).cloned()
    }

    /// Check if a node exists
    pub fn contains(&self, node_id: impl Into<NodeId>) -> bool {
        let node_id = node_id.into();
        self.nodes.lock().contains_key(&node_id)
    }

    pub fn len(&self) -> usize {
        self.nodes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get registry statistics
    pub fn stats(&self) -> RegistryStatsSnapshot {
        self.stats.snapshot(self.len())
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        let (event_sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            nodes: Mutex::new(HashMap::new()),
            stats: RegistryStats::default(),
            event_sender,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Coordinates, NodeStatus};
    use crate::error::Error;
    use assert_matches::assert_matches;

    fn node(id: &str, address: &str) -> Node {
        Node::active(id, address, "9000", Coordinates::new(40.0, -73.0))
    }

    #[test]
    fn test_register_and_get() {
        let registry = NodeRegistry::new();
        registry.register(node("n1", "http://10.0.0.1")).unwrap();

        let entry = registry.get("n1").unwrap();
        assert_eq!(entry.address, "http://10.0.0.1");
        assert!(registry.contains("n1"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_overwrite_is_last_write_wins() {
        let registry = NodeRegistry::new();
        registry.register(node("n1", "http://10.0.0.1")).unwrap();

        let mut second = node("n1", "http://10.0.0.2");
        second.port = "9100".into();
        second.status = NodeStatus::Inactive;
        registry.register(second.clone()).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("n1").unwrap(), second);

        let stats = registry.stats();
        assert_eq!(stats.registrations, 2);
        assert_eq!(stats.overwrites, 1);
        assert_eq!(stats.total_nodes, 1);
    }

    #[test]
    fn test_rejects_empty_id_and_address() {
        let registry = NodeRegistry::new();

        let result = registry.register(node("", "http://10.0.0.1"));
        assert_matches!(result, Err(Error::Validation(_)));

        let result = registry.register(node("n1", ""));
        assert_matches!(result, Err(Error::Validation(_)));

        assert!(registry.is_empty());
        assert_eq!(registry.stats().rejections, 2);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let registry = NodeRegistry::new();
        registry.register(node("n1", "a")).unwrap();

        let snapshot = registry.snapshot();
        registry.register(node("n2", "b")).unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.snapshot().len(), 2);
    }

    #[test]
    fn test_concurrent_registration() {
        let registry = NodeRegistry::new();
        let handles: Vec<_> = (0..64)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    registry
                        .register(node(&format!("node-{:03}", i), "10.0.0.1"))
                        .unwrap();
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), 64);
        for i in 0..64 {
            assert!(registry.contains(format!("node-{:03}", i)));
        }
    }

    #[tokio::test]
    async fn test_events_emitted() {
        let registry = NodeRegistry::new();
        let mut rx = registry.subscribe();

        registry.register(node("n1", "a")).unwrap();
        registry.register(node("n1", "b")).unwrap();
        let _ = registry.register(node("", "c"));

        assert_matches!(
            rx.recv().await.unwrap(),
            RegistryEvent::NodeRegistered { replaced: false, .. }
        );
        assert_matches!(
            rx.recv().await.unwrap(),
            RegistryEvent::NodeRegistered { replaced: true, .. }
        );
        assert_matches!(
            rx.recv().await.unwrap(),
            RegistryEvent::RegistrationRejected { .. }
        );
    }
}
