//! Node Registry Module
//!
//! In-memory registry of self-registered worker nodes, owned by the
//! directory service.

pub mod events;
pub mod node_registry;

pub use events::*;
pub use node_registry::*;
