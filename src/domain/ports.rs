//! Domain Ports - Capability traits for the worker node
//!
//! These traits define the boundaries between the node agent and the outside
//! world (lookup services, the local host). Each environment provides one
//! implementation, chosen by configuration.

use crate::domain::geo::Coordinates;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// =============================================================================
// Address Resolution
// =============================================================================

/// How a worker node advertises itself to the directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AddressMode {
    /// Advertise the public IP together with the node port
    Direct,
    /// Advertise the public URL of a local tunnel agent
    Tunnel,
}

impl std::fmt::Display for AddressMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressMode::Direct => write!(f, "direct"),
            AddressMode::Tunnel => write!(f, "tunnel"),
        }
    }
}

/// Resolves an externally reachable address for this host
#[async_trait]
pub trait AddressResolver: Send + Sync {
    /// Resolve the address (bare IP or full URL)
    async fn resolve(&self) -> Result<String>;

    /// Name used in logs and errors
    fn name(&self) -> &str;
}

/// Resolves geographic coordinates for an IP address
#[async_trait]
pub trait GeoLocator: Send + Sync {
    async fn locate(&self, ip: &str) -> Result<Coordinates>;
}

// =============================================================================
// System Metrics
// =============================================================================

/// Which metrics provider a node samples from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MetricsBackend {
    /// Linux `/proc` filesystem
    Procfs,
    /// No sampling; all values zero
    None,
}

impl std::fmt::Display for MetricsBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricsBackend::Procfs => write!(f, "procfs"),
            MetricsBackend::None => write!(f, "none"),
        }
    }
}

/// Point-in-time resource usage of the local host
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SystemUsage {
    /// Total memory in MiB
    pub memory_total_mb: u64,
    /// Used memory in MiB
    pub memory_used_mb: u64,
    pub memory_used_percent: f64,
    pub cpu_usage_percent: f64,
    /// 1-minute load average
    pub load_avg_1m: f64,
    pub uptime_secs: u64,
}

/// Samples local resource usage
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    async fn sample(&self) -> Result<SystemUsage>;

    fn backend(&self) -> MetricsBackend;
}
