//! Host Module
//!
//! Adapters for the local host and the external lookup services a node
//! depends on: metrics sampling, address resolution and geolocation.

pub mod lookup;
pub mod metrics;

pub use lookup::*;
pub use metrics::*;

use crate::domain::{AddressMode, AddressResolver, GeoLocator, MetricsBackend, MetricsProvider};
use std::sync::Arc;

/// Factory for host capability adapters
pub struct HostFactory;

impl HostFactory {
    /// Create the metrics provider for a backend
    pub fn metrics(backend: MetricsBackend) -> Arc<dyn MetricsProvider> {
        match backend {
            MetricsBackend::Procfs => Arc::new(ProcfsMetrics::new(ProcfsConfig::default())),
            MetricsBackend::None => Arc::new(NullMetrics),
        }
    }

    /// Resolver for the public IP, used for geolocation in every mode
    pub fn public_ip(client: reqwest::Client, config: &LookupConfig) -> Arc<dyn AddressResolver> {
        Arc::new(PublicIpResolver::new(client, config.public_ip_url.clone()))
    }

    pub fn geolocator(client: reqwest::Client, config: &LookupConfig) -> Arc<dyn GeoLocator> {
        Arc::new(HttpGeoLocator::new(client, config.geolocation_url.clone()))
    }

    /// Resolver for the advertised address when it differs from the public IP
    pub fn advertised(
        mode: AddressMode,
        client: reqwest::Client,
        config: &LookupConfig,
    ) -> Option<Arc<dyn AddressResolver>> {
        match mode {
            AddressMode::Direct => None,
            AddressMode::Tunnel => Some(Arc::new(TunnelResolver::new(
                client,
                config.tunnel_api_url.clone(),
            ))),
        }
    }
}
