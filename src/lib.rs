//! Geo Directory - Geo-aware request routing
//!
//! A central directory that worker nodes self-register with, and that
//! redirects each client to the geographically nearest active node.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Directory Service                         │
//! │  ┌──────────────────┐  ┌──────────────────┐  ┌────────────────┐  │
//! │  │  register-node   │  │ redirect-client  │  │ Notification   │  │
//! │  │                  │  │                  │  │ Dispatcher     │  │
//! │  └────────┬─────────┘  └────────┬─────────┘  └───────┬────────┘  │
//! │           │                     │                    │           │
//! │  ┌────────┴─────────┐  ┌────────┴─────────┐          │           │
//! │  │  Node Registry   │◄─┤ Selection Engine │          │           │
//! │  │  (single lock)   │  │   (haversine)    │          │           │
//! │  └──────────────────┘  └──────────────────┘          │           │
//! └──────────────────────────────────────────────────────┼───────────┘
//!             ▲ POST /register-node                      │ POST /receive
//!             │                                          ▼
//! ┌───────────┴──────────────────────────────────────────────────────┐
//! │                         Worker Node Agent                        │
//! │   identity resolution · /health · /receive · /upload · CSV logs  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`directory`]: Directory HTTP service and notification pool
//! - [`registry`]: In-memory node registry
//! - [`selection`]: Nearest-node selection
//! - [`worker`]: Worker node agent
//! - [`host`]: Host metrics and external lookup adapters
//! - [`activity`]: CSV activity logs
//! - [`domain`]: Core domain types and traits
//! - [`error`]: Error types and handling

pub mod activity;
pub mod directory;
pub mod domain;
pub mod error;
pub mod host;
pub mod registry;
pub mod selection;
pub mod shutdown;
pub mod worker;

// Re-export commonly used types
pub use directory::{
    DirectoryConfig, DirectoryMetrics, DirectoryService, DispatchStats, DispatcherConfig,
    NotificationDispatcher,
};

pub use domain::{
    AddressMode, AddressResolver, Coordinates, GeoLocator, MetricsBackend, MetricsProvider, Node,
    NodeStatus, SystemUsage,
};

pub use error::{Error, Result};

pub use host::{HostFactory, LookupConfig};

pub use registry::{NodeId, NodeRegistry, RegistryEvent, RegistryStatsSnapshot};

pub use selection::{Selection, SelectionEngine};

pub use worker::{AgentState, WorkerAgent, WorkerConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
