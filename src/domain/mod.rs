//! Domain layer - Core types and port definitions
//!
//! This module defines the node record, geographic primitives and the
//! capability traits (ports) that adapters implement.

pub mod geo;
pub mod node;
pub mod ports;

pub use geo::*;
pub use node::*;
pub use ports::*;
