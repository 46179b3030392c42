//! Directory Metrics
//!
//! Prometheus counters for registrations, redirects and notification
//! delivery, exposed in text format on `/metrics`.

use crate::error::{Error, Result};
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Metric set owned by one directory instance
pub struct DirectoryMetrics {
    registry: Registry,
    /// `result` = accepted | rejected
    pub registrations: IntCounterVec,
    /// `result` = redirected | bad_request | no_active_nodes
    pub redirects: IntCounterVec,
    /// `outcome` = sent | failed | dropped
    pub notifications: IntCounterVec,
    pub nodes_registered: IntGauge,
}

impl std::fmt::Debug for DirectoryMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryMetrics").finish_non_exhaustive()
    }
}

impl DirectoryMetrics {
    pub fn new() -> Result<Arc<Self>> {
        let registry = Registry::new();

        let registrations = IntCounterVec::new(
            Opts::new("directory_registrations_total", "Node registration attempts"),
            &["result"],
        )
        .map_err(metrics_error)?;
        let redirects = IntCounterVec::new(
            Opts::new("directory_redirects_total", "Client redirect requests"),
            &["result"],
        )
        .map_err(metrics_error)?;
        let notifications = IntCounterVec::new(
            Opts::new("directory_notifications_total", "Selected-node notifications"),
            &["outcome"],
        )
        .map_err(metrics_error)?;
        let nodes_registered = IntGauge::new(
            "directory_nodes_registered",
            "Number of nodes in the registry",
        )
        .map_err(metrics_error)?;

        registry.register(Box::new(registrations.clone())).map_err(metrics_error)?;
        registry.register(Box::new(redirects.clone())).map_err(metrics_error)?;
        registry.register(Box::new(notifications.clone())).map_err(metrics_error)?;
        registry.register(Box::new(nodes_registered.clone())).map_err(metrics_error)?;

        Ok(Arc::new(Self {
            registry,
            registrations,
            redirects,
            notifications,
            nodes_registered,
        }))
    }

    /// Render all metrics in the Prometheus text format
    pub fn render(&self) -> Result<(String, String)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        let body = String::from_utf8(buffer)
            .map_err(|e| Error::Internal(format!("metrics are not UTF-8: {}", e)))?;
        Ok((encoder.format_type().to_string(), body))
    }

    pub fn notification_count(&self, outcome: &str) -> u64 {
        self.notifications.with_label_values(&[outcome]).get()
    }
}

fn metrics_error(e: impl std::fmt::Display) -> Error {
    Error::Internal(format!("metrics error: {}", e))
}
