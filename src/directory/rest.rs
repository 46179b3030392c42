//! Directory REST Handlers
//!
//! Implements `register-node`, `redirect-client`, `receive`, `long-poll` and
//! `metrics`. Each request runs on its own task; the registry is the only
//! state shared between them.

use super::metrics::DirectoryMetrics;
use super::notify::{NotificationDispatcher, REDIRECT_MESSAGE};
use crate::activity::{CsvLog, UsageRecord};
use crate::domain::{MetricsProvider, Node};
use crate::error::{Error, Result};
use crate::registry::NodeRegistry;
use crate::selection::SelectionEngine;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::{any, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

// =============================================================================
// Request/Response Types
// =============================================================================

/// Acknowledgement of an accepted registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub message: String,
    pub node_id: String,
}

/// Client location query
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedirectQuery {
    pub lat: Option<String>,
    pub lon: Option<String>,
}

/// Nearest node returned to a client; coordinates are decimal strings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedirectResponse {
    pub nearest_node_id: String,
    pub nearest_node_ip: String,
    pub nearest_node_port: String,
    pub nearest_node_lat: String,
    pub nearest_node_lon: String,
}

impl From<&Node> for RedirectResponse {
    fn from(node: &Node) -> Self {
        Self {
            nearest_node_id: node.id.clone(),
            nearest_node_ip: node.address.clone(),
            nearest_node_port: node.port.clone(),
            nearest_node_lat: format!("{:.6}", node.latitude),
            nearest_node_lon: format!("{:.6}", node.longitude),
        }
    }
}

/// Generic `{status, message}` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub message: String,
}

impl StatusResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: "ok".into(),
            message: message.into(),
        }
    }
}

// =============================================================================
// Router
// =============================================================================

/// Shared directory state
#[derive(Clone)]
pub struct DirectoryState {
    pub registry: Arc<NodeRegistry>,
    pub engine: SelectionEngine,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub metrics: Arc<DirectoryMetrics>,
    pub host_metrics: Arc<dyn MetricsProvider>,
    pub passive_log: Arc<CsvLog>,
    pub long_poll_delay: Duration,
}

/// Build the directory router
pub fn router(state: DirectoryState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route(
            "/register-node",
            post(register_node).fallback(method_not_allowed),
        )
        .route("/redirect-client", get(redirect_client))
        .route("/receive", any(receive))
        .route("/long-poll", get(long_poll))
        .route("/metrics", get(metrics))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Handlers
// =============================================================================

/// Register or replace a node
async fn register_node(
    State(state): State<DirectoryState>,
    body: Bytes,
) -> Result<Json<RegisterResponse>> {
    let node: Node = match serde_json::from_slice(&body) {
        Ok(node) => node,
        Err(e) => {
            state.metrics.registrations.with_label_values(&["rejected"]).inc();
            return Err(Error::Validation(format!("Invalid request body: {}", e)));
        }
    };

    if let Err(e) = state.registry.register(node.clone()) {
        state.metrics.registrations.with_label_values(&["rejected"]).inc();
        return Err(e);
    }

    state.metrics.registrations.with_label_values(&["accepted"]).inc();
    info!(
        "Node registered: {} at {} ({:.4}, {:.4})",
        node.id, node.address, node.latitude, node.longitude
    );

    Ok(Json(RegisterResponse {
        message: "Node registered successfully".into(),
        node_id: node.id,
    }))
}

async fn method_not_allowed(method: Method) -> Error {
    Error::MethodNotAllowed(format!("Invalid request method {}", method))
}

/// Redirect a client to its nearest active node
async fn redirect_client(
    State(state): State<DirectoryState>,
    Query(query): Query<RedirectQuery>,
) -> Result<Json<RedirectResponse>> {
    let (lat, lon) = match parse_location(&query) {
        Ok(location) => location,
        Err(e) => {
            state.metrics.redirects.with_label_values(&["bad_request"]).inc();
            return Err(e);
        }
    };

    let selection = match state.engine.nearest(lat, lon) {
        Ok(selection) => selection,
        Err(e) => {
            state.metrics.redirects.with_label_values(&["no_active_nodes"]).inc();
            warn!("No active node for client at ({}, {})", lat, lon);
            return Err(e);
        }
    };

    state.metrics.redirects.with_label_values(&["redirected"]).inc();
    info!(
        "Redirecting client at ({}, {}) to node {} ({:.3} km)",
        lat, lon, selection.node.id, selection.distance_km
    );

    let response = RedirectResponse::from(&selection.node);

    // Neither of these is awaited by the client response
    state.dispatcher.notify(&selection.node, REDIRECT_MESSAGE);
    let host_metrics = state.host_metrics.clone();
    let passive_log = state.passive_log.clone();
    tokio::spawn(async move {
        match host_metrics.sample().await {
            Ok(usage) => {
                passive_log
                    .record(&UsageRecord {
                        at: chrono::Local::now(),
                        activity: "System metrics collected".into(),
                        usage,
                    })
                    .await
            }
            Err(e) => warn!("Error collecting system metrics: {}", e),
        }
    });

    Ok(Json(response))
}

/// Parse and validate the client's coordinates
pub fn parse_location(query: &RedirectQuery) -> Result<(f64, f64)> {
    let (Some(lat), Some(lon)) = (query.lat.as_deref(), query.lon.as_deref()) else {
        return Err(Error::Validation("Missing client location parameters".into()));
    };
    if lat.trim().is_empty() || lon.trim().is_empty() {
        return Err(Error::Validation("Missing client location parameters".into()));
    }

    let lat = parse_coordinate(lat)
        .ok_or_else(|| Error::Validation(format!("Invalid latitude value: {}", lat)))?;
    let lon = parse_coordinate(lon)
        .ok_or_else(|| Error::Validation(format!("Invalid longitude value: {}", lon)))?;
    Ok((lat, lon))
}

fn parse_coordinate(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Notification sink and generic echo endpoint
async fn receive(method: Method, body: Bytes) -> Json<StatusResponse> {
    debug!("Received {} request with {} bytes", method, body.len());
    Json(StatusResponse::ok("Request received and processed"))
}

/// Simulated long poll: waits a fixed delay, no event is awaited
async fn long_poll(State(state): State<DirectoryState>) -> Json<StatusResponse> {
    tokio::time::sleep(state.long_poll_delay).await;
    Json(StatusResponse::ok("Long polling response"))
}

async fn metrics(State(state): State<DirectoryState>) -> Result<impl IntoResponse> {
    state.metrics.nodes_registered.set(state.registry.len() as i64);
    let (content_type, body) = state.metrics.render()?;
    Ok((StatusCode::OK, [(header::CONTENT_TYPE, content_type)], body))
}
