//! Directory Server
//!
//! Wires the registry, selection engine, notification pool and activity logs
//! into one service and runs the HTTP listener.

use super::metrics::DirectoryMetrics;
use super::notify::{DispatcherConfig, NotificationDispatcher};
use super::rest::{router, DirectoryState};
use crate::activity::{CsvLog, RegistrationRecord, DIRECTORY_ACTIVE_LOG, DIRECTORY_PASSIVE_LOG};
use crate::domain::MetricsBackend;
use crate::error::{Error, Result};
use crate::host::HostFactory;
use crate::registry::{NodeRegistry, RegistryEvent};
use crate::selection::SelectionEngine;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the directory service
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    /// HTTP bind address
    pub bind_addr: SocketAddr,
    /// Fixed delay of the long-poll endpoint
    pub long_poll_delay: Duration,
    pub dispatcher: DispatcherConfig,
    /// Directory holding the CSV activity logs
    pub log_dir: PathBuf,
    /// Source of the usage samples in the passive log
    pub metrics_backend: MetricsBackend,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            long_poll_delay: Duration::from_secs(10),
            dispatcher: DispatcherConfig::default(),
            log_dir: PathBuf::from("."),
            metrics_backend: MetricsBackend::Procfs,
        }
    }
}

// =============================================================================
// Directory Service
// =============================================================================

/// The directory: owns the registry and serves the routing API
pub struct DirectoryService {
    config: DirectoryConfig,
    state: DirectoryState,
}

impl DirectoryService {
    /// Build the service; must be called inside a tokio runtime
    pub fn new(config: DirectoryConfig) -> Result<Self> {
        let registry = NodeRegistry::new();
        let metrics = DirectoryMetrics::new()?;
        let dispatcher = NotificationDispatcher::start(
            config.dispatcher.clone(),
            reqwest::Client::new(),
            metrics.clone(),
        );

        let active_log = Arc::new(CsvLog::new(&config.log_dir, DIRECTORY_ACTIVE_LOG));
        spawn_activity_logger(registry.subscribe(), active_log);

        let state = DirectoryState {
            engine: SelectionEngine::new(registry.clone()),
            registry,
            dispatcher,
            metrics,
            host_metrics: HostFactory::metrics(config.metrics_backend),
            passive_log: Arc::new(CsvLog::new(&config.log_dir, DIRECTORY_PASSIVE_LOG)),
            long_poll_delay: config.long_poll_delay,
        };

        Ok(Self { config, state })
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.state.registry
    }

    pub fn dispatcher(&self) -> &Arc<NotificationDispatcher> {
        &self.state.dispatcher
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Serve until `shutdown` resolves
    pub async fn run(&self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| Error::Internal(format!("Failed to bind directory server: {}", e)))?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve(
        &self,
        listener: tokio::net::TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let addr = listener.local_addr()?;
        info!("Directory listening on {}", addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                shutdown.await;
                info!("Directory server shutting down");
            })
            .await
            .map_err(|e| Error::Internal(format!("Directory server error: {}", e)))?;

        self.state.dispatcher.shutdown();
        let stats = self.state.dispatcher.stats();
        info!(
            "Notifications: {} sent, {} failed, {} dropped",
            stats.sent, stats.failed, stats.dropped
        );
        Ok(())
    }
}

/// Write one active-log row per registry event until the registry is dropped
fn spawn_activity_logger(mut events: broadcast::Receiver<RegistryEvent>, log: Arc<CsvLog>) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let node = match &event {
                        RegistryEvent::NodeRegistered { node, .. } => Some(node.clone()),
                        RegistryEvent::RegistrationRejected { .. } => None,
                    };
                    log.record(&RegistrationRecord {
                        at: chrono::Local::now(),
                        action: event.action().to_string(),
                        node,
                    })
                    .await;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Activity log lagged, {} registry events skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
