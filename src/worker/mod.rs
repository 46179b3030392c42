//! Worker Node
//!
//! Edge node agent: discovers its address and location, registers with the
//! directory and serves client traffic.
//!
//! # Endpoints
//!
//! - `GET  /health` - Liveness
//! - `POST /receive` - Payload sink; each call is logged with enrichment
//! - `POST /upload` - Multipart file upload (field `file`)

pub mod agent;
pub mod config;
pub mod rest;

pub use agent::{build_node, resolve_identity, self_register, AgentState, Identity, WorkerAgent};
pub use config::{WorkerConfig, DEFAULT_UPLOAD_LIMIT};
pub use rest::{router, WorkerState};
