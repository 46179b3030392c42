//! Notification Dispatcher
//!
//! Delivers "you were selected" messages to nodes without ever blocking the
//! redirect that triggered them. Notifications go onto a bounded queue drained
//! by a fixed pool of workers; when the queue is full the notification is
//! dropped and counted. Delivery failures are logged and counted, never
//! retried and never reported to the redirected client.

use super::metrics::DirectoryMetrics;
use crate::domain::Node;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Message sent to a node chosen for a client
pub const REDIRECT_MESSAGE: &str = "Client redirected to your server";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the dispatcher pool
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Number of concurrent delivery workers
    pub workers: usize,
    /// Notifications that may wait for a worker before new ones are dropped
    pub queue_capacity: usize,
    /// Upper bound on one delivery; a node that never answers frees its
    /// worker after this long
    pub request_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
            request_timeout: Duration::from_secs(5),
        }
    }
}

// =============================================================================
// Payload
// =============================================================================

/// Body POSTed to the node's receive endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub node_id: String,
    pub message: String,
}

#[derive(Debug)]
struct Delivery {
    url: String,
    notification: Notification,
}

/// Snapshot of delivery counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchStats {
    pub sent: u64,
    pub failed: u64,
    pub dropped: u64,
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Bounded fire-and-forget notification pool
pub struct NotificationDispatcher {
    sender: mpsc::Sender<Delivery>,
    metrics: Arc<DirectoryMetrics>,
    cancel: CancellationToken,
}

impl NotificationDispatcher {
    /// Start the worker pool on the current runtime
    pub fn start(
        config: DispatcherConfig,
        client: reqwest::Client,
        metrics: Arc<DirectoryMetrics>,
    ) -> Arc<Self> {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let cancel = CancellationToken::new();

        for worker_id in 0..config.workers.max(1) {
            let receiver = receiver.clone();
            let client = client.clone();
            let metrics = metrics.clone();
            let cancel = cancel.clone();
            let timeout = config.request_timeout;
            tokio::spawn(async move {
                run_worker(worker_id, receiver, client, timeout, metrics, cancel).await;
            });
        }

        info!(
            "Notification dispatcher started ({} workers, queue {})",
            config.workers.max(1),
            config.queue_capacity.max(1)
        );

        Arc::new(Self {
            sender,
            metrics,
            cancel,
        })
    }

    /// Queue a notification for `node`; returns false if it was dropped
    pub fn notify(&self, node: &Node, message: &str) -> bool {
        let delivery = Delivery {
            url: node.receive_url(),
            notification: Notification {
                node_id: node.id.clone(),
                message: message.to_string(),
            },
        };

        match self.sender.try_send(delivery) {
            Ok(()) => true,
            Err(e) => {
                warn!("Dropping notification for node {}: {}", node.id, e);
                self.metrics.notifications.with_label_values(&["dropped"]).inc();
                false
            }
        }
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            sent: self.metrics.notification_count("sent"),
            failed: self.metrics.notification_count("failed"),
            dropped: self.metrics.notification_count("dropped"),
        }
    }

    /// Stop the workers; queued notifications are abandoned
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for NotificationDispatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_worker(
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<Delivery>>>,
    client: reqwest::Client,
    timeout: Duration,
    metrics: Arc<DirectoryMetrics>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => None,
            delivery = async { receiver.lock().await.recv().await } => delivery,
        };
        let Some(delivery) = next else {
            debug!("Notification worker {} stopping", worker_id);
            return;
        };

        let outcome = if deliver(&client, &delivery, timeout).await {
            "sent"
        } else {
            "failed"
        };
        metrics.notifications.with_label_values(&[outcome]).inc();
    }
}

async fn deliver(client: &reqwest::Client, delivery: &Delivery, timeout: Duration) -> bool {
    debug!("Sending message to node: {}", delivery.url);

    let response = match client
        .post(&delivery.url)
        .json(&delivery.notification)
        .timeout(timeout)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            warn!(
                "Error sending message to node {}: {}",
                delivery.notification.node_id, e
            );
            return false;
        }
    };

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if status.is_success() {
        info!(
            "Notified node {} ({}): {}",
            delivery.notification.node_id,
            status,
            body.trim()
        );
        true
    } else {
        warn!(
            "Node {} rejected notification with {}: {}",
            delivery.notification.node_id,
            status,
            body.trim()
        );
        false
    }
}
