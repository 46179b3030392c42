//! Worker Node Agent
//!
//! Resolves the node's identity, registers it with the directory once and
//! serves the node endpoints until shutdown.

use super::config::WorkerConfig;
use super::rest::{router, WorkerState};
use crate::activity::{ActivityRecord, CsvLog, NODE_ACTIVE_LOG, NODE_PASSIVE_LOG};
use crate::domain::{AddressResolver, Coordinates, GeoLocator, MetricsProvider, Node};
use crate::error::{Error, Result};
use crate::host::{local_ipv4, HostFactory, LatencyProbe};
use parking_lot::RwLock;
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tracing::{info, warn};

// =============================================================================
// Agent State
// =============================================================================

/// Lifecycle of the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Starting,
    Running,
    Stopping,
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentState::Starting => write!(f, "starting"),
            AgentState::Running => write!(f, "running"),
            AgentState::Stopping => write!(f, "stopping"),
        }
    }
}

// =============================================================================
// Identity
// =============================================================================

/// Everything the node learns about itself at startup
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    /// Address registered with the directory
    pub advertised_address: String,
    pub public_ip: String,
    pub coordinates: Coordinates,
    /// First non-loopback IPv4 interface, if any
    pub local_ip: Option<Ipv4Addr>,
}

/// Resolve identity concurrently
///
/// Geolocation of the public IP is required. The advertised resolver, when
/// given, is required too; without one the public IP is advertised. The local
/// interface address is informational only.
pub async fn resolve_identity(
    public_ip: &dyn AddressResolver,
    advertised: Option<&dyn AddressResolver>,
    geo: &dyn GeoLocator,
) -> Result<Identity> {
    let located = async {
        let ip = public_ip.resolve().await?;
        let coordinates = geo.locate(&ip).await?;
        Ok::<_, Error>((ip, coordinates))
    };
    let advertised_address = async {
        match advertised {
            Some(resolver) => resolver.resolve().await.map(Some),
            None => Ok(None),
        }
    };
    let local_ip = async {
        tokio::task::spawn_blocking(local_ipv4)
            .await
            .map_err(|e| Error::Internal(format!("interface lookup panicked: {}", e)))
            .and_then(|r| r)
    };

    let (located, advertised_address, local_ip) =
        tokio::join!(located, advertised_address, local_ip);

    let (public_ip, coordinates) = located?;
    info!(
        "Geolocation fetched: Latitude: {:.6}, Longitude: {:.6}",
        coordinates.latitude, coordinates.longitude
    );

    let advertised_address = advertised_address?.unwrap_or_else(|| public_ip.clone());

    let local_ip = match local_ip {
        Ok(ip) => Some(ip),
        Err(e) => {
            warn!("Local IP address unavailable: {}", e);
            None
        }
    };

    Ok(Identity {
        advertised_address,
        public_ip,
        coordinates,
        local_ip,
    })
}

/// Build the record this node registers with
pub fn build_node(identity: &Identity, port: u16) -> Node {
    Node::active(
        uuid::Uuid::new_v4().to_string(),
        identity.advertised_address.clone(),
        port.to_string(),
        identity.coordinates,
    )
}

/// Register `node` with the directory once
pub async fn self_register(
    client: &reqwest::Client,
    register_url: &str,
    node: &Node,
    passive_log: &CsvLog,
) -> Result<()> {
    info!("Attempting to register with the directory at {}", register_url);

    let response = match client.post(register_url).json(node).send().await {
        Ok(response) => response,
        Err(e) => {
            passive_log
                .record(&ActivityRecord::now("Node registration failed"))
                .await;
            return Err(Error::dependency("directory", e));
        }
    };

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    info!("Directory response: {}", body.trim());

    if status.is_success() {
        info!("Node {} registered with the directory", node.id);
        passive_log
            .record(&ActivityRecord::now("Node registered with main server"))
            .await;
        Ok(())
    } else {
        passive_log
            .record(&ActivityRecord::now("Node registration failed"))
            .await;
        Err(Error::dependency(
            "directory",
            format!("registration returned status {}", status),
        ))
    }
}

// =============================================================================
// Worker Agent
// =============================================================================

/// A worker node process
pub struct WorkerAgent {
    config: WorkerConfig,
    client: reqwest::Client,
    public_ip: Arc<dyn AddressResolver>,
    advertised: Option<Arc<dyn AddressResolver>>,
    geo: Arc<dyn GeoLocator>,
    metrics: Arc<dyn MetricsProvider>,
    state: Arc<RwLock<AgentState>>,
}

impl WorkerAgent {
    /// Create an agent with the adapters selected by `config`
    pub fn new(config: WorkerConfig) -> Self {
        let client = reqwest::Client::new();
        let public_ip = HostFactory::public_ip(client.clone(), &config.lookup);
        let advertised = HostFactory::advertised(config.address_mode, client.clone(), &config.lookup);
        let geo = HostFactory::geolocator(client.clone(), &config.lookup);
        let metrics = HostFactory::metrics(config.metrics_backend);
        Self::with_adapters(config, client, public_ip, advertised, geo, metrics)
    }

    pub fn with_adapters(
        config: WorkerConfig,
        client: reqwest::Client,
        public_ip: Arc<dyn AddressResolver>,
        advertised: Option<Arc<dyn AddressResolver>>,
        geo: Arc<dyn GeoLocator>,
        metrics: Arc<dyn MetricsProvider>,
    ) -> Self {
        Self {
            config,
            client,
            public_ip,
            advertised,
            geo,
            metrics,
            state: Arc::new(RwLock::new(AgentState::Starting)),
        }
    }

    pub fn state(&self) -> AgentState {
        *self.state.read()
    }

    fn set_state(&self, state: AgentState) {
        transition(&self.state, state);
    }

    /// Resolve, bind the configured port, register and serve until `shutdown`
    pub async fn run(&self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        self.config.validate()?;
        let identity = self.resolve().await?;
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Internal(format!("Failed to bind worker server: {}", e)))?;
        self.serve(identity, listener, shutdown).await
    }

    /// Resolve this node's identity
    pub async fn resolve(&self) -> Result<Identity> {
        let identity = resolve_identity(
            self.public_ip.as_ref(),
            self.advertised.as_deref(),
            self.geo.as_ref(),
        )
        .await?;
        info!("Public IP address: {}", identity.public_ip);
        info!("Advertised address: {}", identity.advertised_address);
        if let Some(local_ip) = identity.local_ip {
            info!("Local IP address: {}", local_ip);
        }
        Ok(identity)
    }

    /// Register and serve on an already bound listener
    pub async fn serve(
        &self,
        identity: Identity,
        listener: tokio::net::TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let node = Arc::new(build_node(&identity, self.config.port));
        info!("Node id: {}", node.id);

        let active_log = Arc::new(CsvLog::new(&self.config.data_dir, NODE_ACTIVE_LOG));
        let passive_log = Arc::new(CsvLog::new(&self.config.data_dir, NODE_PASSIVE_LOG));

        if let Err(e) =
            self_register(&self.client, &self.config.register_url(), &node, &passive_log).await
        {
            warn!("Error registering node with the directory: {}", e);
        }

        let probe = LatencyProbe::new(
            self.config.lookup.latency_target.clone(),
            self.config.lookup.latency_connect_timeout,
        )?;
        let state = WorkerState {
            node,
            geo: self.geo.clone(),
            metrics: self.metrics.clone(),
            probe: Arc::new(probe),
            active_log,
            passive_log,
            data_dir: self.config.data_dir.clone(),
            upload_limit: self.config.upload_limit,
        };

        info!("Worker node listening on {}", listener.local_addr()?);
        self.set_state(AgentState::Running);

        let app = router(state).into_make_service_with_connect_info::<SocketAddr>();
        let agent_state = self.state.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.await;
                // In-flight requests drain after this point
                transition(&agent_state, AgentState::Stopping);
            })
            .await
            .map_err(|e| Error::Internal(format!("Worker server error: {}", e)))?;

        info!("Worker node stopped");
        Ok(())
    }
}

fn transition(state: &RwLock<AgentState>, next: AgentState) {
    *state.write() = next;
    info!("Worker agent {}", next);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{DirectoryConfig, DirectoryService};
    use crate::domain::{AddressMode, MetricsBackend};
    use crate::host::NullMetrics;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use std::time::Duration;
    use tempfile::TempDir;

    struct StaticResolver(&'static str);

    #[async_trait]
    impl AddressResolver for StaticResolver {
        async fn resolve(&self) -> Result<String> {
            Ok(self.0.to_string())
        }

        fn name(&self) -> &str {
            "static"
        }
    }

    struct FailingResolver;

    #[async_trait]
    impl AddressResolver for FailingResolver {
        async fn resolve(&self) -> Result<String> {
            Err(Error::dependency("tunnel", "no tunnels running"))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    struct StaticLocator(Option<Coordinates>);

    #[async_trait]
    impl GeoLocator for StaticLocator {
        async fn locate(&self, ip: &str) -> Result<Coordinates> {
            self.0
                .ok_or_else(|| Error::dependency("geolocation", format!("no data for {}", ip)))
        }
    }

    #[tokio::test]
    async fn test_resolve_identity_direct() {
        let identity = resolve_identity(
            &StaticResolver("203.0.113.7"),
            None,
            &StaticLocator(Some(Coordinates::new(51.5, -0.12))),
        )
        .await
        .unwrap();

        assert_eq!(identity.public_ip, "203.0.113.7");
        assert_eq!(identity.advertised_address, "203.0.113.7");
        assert_eq!(identity.coordinates, Coordinates::new(51.5, -0.12));
    }

    #[tokio::test]
    async fn test_resolve_identity_tunnel() {
        let tunnel = StaticResolver("https://abcd.ngrok-free.app");
        let identity = resolve_identity(
            &StaticResolver("203.0.113.7"),
            Some(&tunnel as &dyn AddressResolver),
            &StaticLocator(Some(Coordinates::new(1.0, 2.0))),
        )
        .await
        .unwrap();
        assert_eq!(identity.advertised_address, "https://abcd.ngrok-free.app");
    }

    #[tokio::test]
    async fn test_geolocation_failure_is_fatal() {
        let result = resolve_identity(&StaticResolver("203.0.113.7"), None, &StaticLocator(None)).await;
        assert_matches!(result, Err(Error::Dependency { .. }));
    }

    #[tokio::test]
    async fn test_required_tunnel_failure_is_fatal() {
        let result = resolve_identity(
            &StaticResolver("203.0.113.7"),
            Some(&FailingResolver as &dyn AddressResolver),
            &StaticLocator(Some(Coordinates::new(1.0, 2.0))),
        )
        .await;
        assert_matches!(result, Err(Error::Dependency { .. }));
    }

    #[test]
    fn test_build_node() {
        let identity = Identity {
            advertised_address: "https://abcd.ngrok-free.app".into(),
            public_ip: "203.0.113.7".into(),
            coordinates: Coordinates::new(1.0, 2.0),
            local_ip: None,
        };
        let a = build_node(&identity, 8081);
        let b = build_node(&identity, 8081);

        assert!(a.is_active());
        assert_eq!(a.port, "8081");
        assert_eq!(a.address, "https://abcd.ngrok-free.app");
        assert!(uuid::Uuid::parse_str(&a.id).is_ok());
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_self_register_unreachable_directory() {
        let dir = TempDir::new().unwrap();
        let log = CsvLog::new(dir.path(), NODE_PASSIVE_LOG);
        let node = Node::active("n1", "10.0.0.1", "8081", Coordinates::default());

        let result = self_register(
            &reqwest::Client::new(),
            "http://127.0.0.1:1/register-node",
            &node,
            &log,
        )
        .await;
        assert_matches!(result, Err(Error::Dependency { .. }));

        let contents = tokio::fs::read_to_string(log.path()).await.unwrap();
        assert!(contents.contains("Node registration failed"));
    }

    #[tokio::test]
    async fn test_agent_registers_and_serves() {
        let dir = TempDir::new().unwrap();

        let directory = DirectoryService::new(DirectoryConfig {
            log_dir: dir.path().join("directory"),
            metrics_backend: MetricsBackend::None,
            ..Default::default()
        })
        .unwrap();
        let registry = directory.registry().clone();
        let directory_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let directory_addr = directory_listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = directory
                .serve(directory_listener, std::future::pending::<()>())
                .await;
        });

        let config = WorkerConfig {
            directory_url: format!("http://{}", directory_addr),
            address_mode: AddressMode::Direct,
            metrics_backend: MetricsBackend::None,
            data_dir: dir.path().join("node"),
            ..Default::default()
        };
        let agent = Arc::new(WorkerAgent::with_adapters(
            config,
            reqwest::Client::new(),
            Arc::new(StaticResolver("127.0.0.1")),
            None,
            Arc::new(StaticLocator(Some(Coordinates::new(40.0, -73.0)))),
            Arc::new(NullMetrics),
        ));
        assert_eq!(agent.state(), AgentState::Starting);

        let identity = agent.resolve().await.unwrap();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let worker_addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn({
            let agent = agent.clone();
            async move {
                agent
                    .serve(identity, listener, async {
                        let _ = rx.await;
                    })
                    .await
            }
        });

        for _ in 0..100 {
            if agent.state() == AgentState::Running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(agent.state(), AgentState::Running);

        let nodes = registry.snapshot();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].address, "127.0.0.1");
        assert_eq!(nodes[0].port, "8081");
        assert!(nodes[0].is_active());

        let health: serde_json::Value = reqwest::get(format!("http://{}/health", worker_addr))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "active");

        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
        assert_eq!(agent.state(), AgentState::Stopping);
    }

    #[tokio::test]
    async fn test_stopping_while_requests_drain() {
        use tokio::io::AsyncWriteExt;

        let dir = TempDir::new().unwrap();
        let config = WorkerConfig {
            directory_url: "http://127.0.0.1:1".into(),
            address_mode: AddressMode::Direct,
            metrics_backend: MetricsBackend::None,
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let agent = Arc::new(WorkerAgent::with_adapters(
            config,
            reqwest::Client::new(),
            Arc::new(StaticResolver("127.0.0.1")),
            None,
            Arc::new(StaticLocator(Some(Coordinates::new(40.0, -73.0)))),
            Arc::new(NullMetrics),
        ));
        let identity = agent.resolve().await.unwrap();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let worker_addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn({
            let agent = agent.clone();
            async move {
                agent
                    .serve(identity, listener, async {
                        let _ = rx.await;
                    })
                    .await
            }
        });
        for _ in 0..100 {
            if agent.state() == AgentState::Running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(agent.state(), AgentState::Running);

        // An upload whose body is only partly sent keeps its request in flight
        let mut stream = tokio::net::TcpStream::connect(worker_addr).await.unwrap();
        let head = format!(
            "POST /upload HTTP/1.1\r\nHost: {}\r\nContent-Type: multipart/form-data; boundary=B\r\nContent-Length: 4096\r\n\r\n--B\r\n",
            worker_addr
        );
        stream.write_all(head.as_bytes()).await.unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        tx.send(()).unwrap();
        for _ in 0..100 {
            if agent.state() == AgentState::Stopping {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(agent.state(), AgentState::Stopping);
        assert!(!handle.is_finished());

        drop(stream);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(agent.state(), AgentState::Stopping);
    }
}
