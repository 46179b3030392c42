//! Activity Logs
//!
//! Append-only CSV sinks for interaction ("active") and background
//! ("passive") events. Write failures are reported through `tracing` and
//! never reach HTTP callers.

pub mod csv_log;
pub mod records;

pub use csv_log::*;
pub use records::*;
