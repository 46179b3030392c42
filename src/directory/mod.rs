//! Directory Service
//!
//! Central HTTP service that accepts node registrations and redirects clients
//! to their geographically nearest active node.
//!
//! # Endpoints
//!
//! - `POST /register-node` - Register or replace a node
//! - `GET  /redirect-client?lat=&lon=` - Nearest active node for a location
//! - `ANY  /receive` - Generic payload sink
//! - `GET  /long-poll` - Fixed-delay poll stub
//! - `GET  /metrics` - Prometheus metrics

pub mod metrics;
pub mod notify;
pub mod rest;
pub mod server;

pub use metrics::DirectoryMetrics;
pub use notify::{DispatchStats, DispatcherConfig, Notification, NotificationDispatcher};
pub use rest::{router, DirectoryState};
pub use server::{DirectoryConfig, DirectoryService};
