//! Selection Module
//!
//! Picks the geographically nearest active node for a client location.

pub mod engine;

pub use engine::*;
