//! External Lookup Adapters
//!
//! HTTP clients for the public-IP, tunnel-agent and geolocation services a
//! worker node depends on at startup, plus local interface discovery and the
//! latency probe. None of these calls carries a request timeout except the
//! probe's connect timeout.

use crate::domain::{AddressResolver, Coordinates, GeoLocator};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::time::{Duration, Instant};
use tracing::{debug, info};

// =============================================================================
// Configuration
// =============================================================================

/// Endpoints of the lookup services
#[derive(Debug, Clone)]
pub struct LookupConfig {
    /// Returns the caller's public IP as plain text
    pub public_ip_url: String,
    /// Local tunnel agent API listing active tunnels
    pub tunnel_api_url: String,
    /// Geolocation API; the IP is appended as a path segment
    pub geolocation_url: String,
    /// Target of the latency probe
    pub latency_target: String,
    /// Connect timeout of the latency probe
    pub latency_connect_timeout: Duration,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            public_ip_url: "https://api.ipify.org?format=text".to_string(),
            tunnel_api_url: "http://localhost:4040/api/tunnels".to_string(),
            geolocation_url: "http://ip-api.com/json".to_string(),
            latency_target: "https://google.com".to_string(),
            latency_connect_timeout: Duration::from_secs(5),
        }
    }
}

// =============================================================================
// Public IP
// =============================================================================

/// Resolves the host's public IP through a plain-text lookup service
pub struct PublicIpResolver {
    client: reqwest::Client,
    url: String,
}

impl PublicIpResolver {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl AddressResolver for PublicIpResolver {
    async fn resolve(&self) -> Result<String> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::dependency(self.name(), e))?
            .error_for_status()
            .map_err(|e| Error::dependency(self.name(), e))?;

        let body = response
            .text()
            .await
            .map_err(|e| Error::dependency(self.name(), e))?;
        let ip = body.trim();
        if ip.is_empty() {
            return Err(Error::dependency(self.name(), "empty response"));
        }

        debug!("Public IP resolved: {}", ip);
        Ok(ip.to_string())
    }

    fn name(&self) -> &str {
        "public-ip"
    }
}

// =============================================================================
// Tunnel Agent
// =============================================================================

#[derive(Debug, Deserialize)]
struct TunnelList {
    #[serde(default)]
    tunnels: Vec<Tunnel>,
}

#[derive(Debug, Deserialize)]
struct Tunnel {
    public_url: String,
}

/// Resolves the public URL of the first tunnel exposed by a local agent
pub struct TunnelResolver {
    client: reqwest::Client,
    api_url: String,
}

impl TunnelResolver {
    pub fn new(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
        }
    }
}

#[async_trait]
impl AddressResolver for TunnelResolver {
    async fn resolve(&self) -> Result<String> {
        let list: TunnelList = self
            .client
            .get(&self.api_url)
            .send()
            .await
            .map_err(|e| Error::dependency(self.name(), e))?
            .error_for_status()
            .map_err(|e| Error::dependency(self.name(), e))?
            .json()
            .await
            .map_err(|e| Error::dependency(self.name(), e))?;

        let url = list
            .tunnels
            .into_iter()
            .map(|t| t.public_url)
            .find(|u| !u.is_empty())
            .ok_or_else(|| Error::dependency(self.name(), "no tunnels found"))?;

        info!("Tunnel public URL: {}", url);
        Ok(url)
    }

    fn name(&self) -> &str {
        "tunnel"
    }
}

// =============================================================================
// Geolocation
// =============================================================================

#[derive(Debug, Deserialize)]
struct GeoResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

/// Geolocates IPs through an ip-api compatible JSON service
pub struct HttpGeoLocator {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGeoLocator {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl GeoLocator for HttpGeoLocator {
    async fn locate(&self, ip: &str) -> Result<Coordinates> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), ip);
        let geo: GeoResponse = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::dependency("geolocation", e))?
            .json()
            .await
            .map_err(|e| Error::dependency("geolocation", e))?;

        if geo.status.as_deref() == Some("fail") {
            return Err(Error::dependency(
                "geolocation",
                geo.message.unwrap_or_else(|| format!("lookup failed for {}", ip)),
            ));
        }

        match (geo.lat, geo.lon) {
            (Some(lat), Some(lon)) => Ok(Coordinates::new(lat, lon)),
            _ => Err(Error::dependency(
                "geolocation",
                format!("no coordinates returned for {}", ip),
            )),
        }
    }
}

// =============================================================================
// Local Interfaces
// =============================================================================

/// First non-loopback IPv4 address among the host's interfaces
pub fn local_ipv4() -> Result<Ipv4Addr> {
    let interfaces = local_ip_address::list_afinet_netifas()
        .map_err(|e| Error::dependency("local-interfaces", e))?;
    first_non_loopback_v4(interfaces.into_iter().map(|(_, ip)| ip))
        .ok_or_else(|| Error::dependency("local-interfaces", "no IP address found"))
}

fn first_non_loopback_v4(addrs: impl IntoIterator<Item = IpAddr>) -> Option<Ipv4Addr> {
    addrs.into_iter().find_map(|ip| match ip {
        IpAddr::V4(v4) if !v4.is_loopback() => Some(v4),
        _ => None,
    })
}

// =============================================================================
// Latency Probe
// =============================================================================

/// Measures round-trip time of a GET against a fixed target
pub struct LatencyProbe {
    client: reqwest::Client,
    target: String,
}

impl LatencyProbe {
    pub fn new(target: impl Into<String>, connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self {
            client,
            target: target.into(),
        })
    }

    /// Round-trip time in milliseconds
    pub async fn measure(&self) -> Result<f64> {
        let start = Instant::now();
        self.client
            .get(&self.target)
            .send()
            .await
            .map_err(|e| Error::dependency("latency-probe", e))?;
        Ok(start.elapsed().as_secs_f64() * 1000.0)
    }
}
