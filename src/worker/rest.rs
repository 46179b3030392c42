//! Worker Node REST Handlers
//!
//! `GET /health`, `POST /receive` and `POST /upload`. The receive handler
//! answers immediately; caller geolocation, the usage sample and the latency
//! probe run afterwards on their own task and end up in the active log.

use crate::activity::{ActivityRecord, CsvLog, InteractionRecord};
use crate::directory::rest::StatusResponse;
use crate::domain::{GeoLocator, MetricsProvider, Node};
use crate::error::{Error, Result};
use crate::host::LatencyProbe;
use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, ConnectInfo, DefaultBodyLimit, Multipart, State},
    http::{header, Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Multipart field carrying the uploaded file
pub const UPLOAD_FIELD: &str = "file";

/// Shared worker node state
#[derive(Clone)]
pub struct WorkerState {
    /// The record this node registered with
    pub node: Arc<Node>,
    pub geo: Arc<dyn GeoLocator>,
    pub metrics: Arc<dyn MetricsProvider>,
    pub probe: Arc<LatencyProbe>,
    pub active_log: Arc<CsvLog>,
    pub passive_log: Arc<CsvLog>,
    pub data_dir: PathBuf,
    pub upload_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub status: String,
    pub message: String,
    pub path: String,
}

/// Build the worker router
pub fn router(state: WorkerState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);
    let upload_limit = state.upload_limit;

    Router::new()
        .route("/health", get(health))
        .route("/receive", post(receive))
        .route(
            "/upload",
            post(upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<WorkerState>) -> Json<HealthResponse> {
    let log = state.passive_log.clone();
    tokio::spawn(async move {
        log.record(&ActivityRecord::now("Health check received")).await;
    });
    Json(HealthResponse {
        status: "active".into(),
    })
}

async fn receive(
    State(state): State<WorkerState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    body: Bytes,
) -> Json<StatusResponse> {
    let client_ip = connect_info
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    debug!("Received {} bytes from {}", body.len(), client_ip);

    tokio::spawn(record_interaction(
        state,
        client_ip,
        String::from_utf8_lossy(&body).into_owned(),
    ));

    Json(StatusResponse::ok("Request received and processed"))
}

/// Enrich one received payload and append it to the activity logs
async fn record_interaction(state: WorkerState, client_ip: String, client_data: String) {
    let at = chrono::Local::now();
    let (location, usage, latency) = tokio::join!(
        state.geo.locate(&client_ip),
        state.metrics.sample(),
        state.probe.measure(),
    );

    let client = location.unwrap_or_else(|e| {
        warn!("Error fetching client geolocation for {}: {}", client_ip, e);
        Default::default()
    });
    let usage = usage.unwrap_or_else(|e| {
        warn!("Error capturing system usage: {}", e);
        Default::default()
    });
    let latency_ms = latency.unwrap_or_else(|e| {
        warn!("Error measuring latency: {}", e);
        -1.0
    });

    state
        .active_log
        .record(&InteractionRecord {
            client_ip,
            client_latitude: client.latitude,
            client_longitude: client.longitude,
            node_latitude: state.node.latitude,
            node_longitude: state.node.longitude,
            latency_ms,
            at,
            client_data,
            usage,
        })
        .await;
    state
        .passive_log
        .record(&ActivityRecord::now("Request received and processed"))
        .await;
}

async fn upload(
    State(state): State<WorkerState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>> {
    let mut multipart =
        multipart.map_err(|e| Error::Validation(format!("Malformed upload: {}", e)))?;

    loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error(e, state.upload_limit))?;
        let Some(field) = field else {
            return Err(Error::Validation(format!(
                "Missing multipart field '{}'",
                UPLOAD_FIELD
            )));
        };
        if field.name() != Some(UPLOAD_FIELD) {
            debug!("Ignoring multipart field {:?}", field.name());
            continue;
        }

        let file_name = field
            .file_name()
            .and_then(sanitize_file_name)
            .ok_or_else(|| Error::Validation("Upload has no usable file name".into()))?;
        let data = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e, state.upload_limit))?;

        let path = state.data_dir.join(&file_name);
        tokio::fs::create_dir_all(&state.data_dir)
            .await
            .map_err(|e| Error::Upload(format!("Error ensuring uploads folder: {}", e)))?;
        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| Error::Upload(format!("Error saving the file: {}", e)))?;

        info!("File uploaded successfully: {} ({} bytes)", path.display(), data.len());
        return Ok(Json(UploadResponse {
            status: "success".into(),
            message: "File uploaded successfully".into(),
            path: path.display().to_string(),
        }));
    }
}

fn multipart_error(e: axum::extract::multipart::MultipartError, limit: usize) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge { limit }
    } else {
        Error::Validation(format!("Malformed upload: {}", e))
    }
}

/// Reduce a client-supplied name to its final path component
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next()?.trim();
    match base {
        "" | "." | ".." => None,
        _ => Some(base.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{NODE_ACTIVE_LOG, NODE_PASSIVE_LOG};
    use crate::domain::{Coordinates, SystemUsage};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct FixedLocator(Coordinates);

    #[async_trait]
    impl GeoLocator for FixedLocator {
        async fn locate(&self, _ip: &str) -> Result<Coordinates> {
            Ok(self.0)
        }
    }

    struct FixedMetrics;

    #[async_trait]
    impl MetricsProvider for FixedMetrics {
        async fn sample(&self) -> Result<SystemUsage> {
            Ok(SystemUsage {
                memory_total_mb: 2048,
                memory_used_mb: 1024,
                memory_used_percent: 50.0,
                ..Default::default()
            })
        }

        fn backend(&self) -> crate::domain::MetricsBackend {
            crate::domain::MetricsBackend::None
        }
    }

    fn state(dir: &TempDir, limit: usize) -> WorkerState {
        WorkerState {
            node: Arc::new(Node::active(
                "w1",
                "10.0.0.9",
                "8081",
                Coordinates::new(48.0, 2.0),
            )),
            geo: Arc::new(FixedLocator(Coordinates::new(40.0, -73.0))),
            metrics: Arc::new(FixedMetrics),
            // Nothing listens on port 1, so the probe fails fast
            probe: Arc::new(
                LatencyProbe::new("http://127.0.0.1:1", Duration::from_millis(200)).unwrap(),
            ),
            active_log: Arc::new(CsvLog::new(dir.path(), NODE_ACTIVE_LOG)),
            passive_log: Arc::new(CsvLog::new(dir.path(), NODE_PASSIVE_LOG)),
            data_dir: dir.path().join("uploads"),
            upload_limit: limit,
        }
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn multipart_request(field: &str, file_name: &str, data: &[u8]) -> Request<Body> {
        let boundary = "XBOUNDARYX";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"{f}\"; filename=\"{n}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                b = boundary,
                f = field,
                n = file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn wait_for_lines(path: &std::path::Path, count: usize) -> Vec<String> {
        for _ in 0..100 {
            if let Ok(contents) = tokio::fs::read_to_string(path).await {
                let lines: Vec<String> = contents.lines().map(String::from).collect();
                if lines.len() >= count {
                    return lines;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("{} never reached {} lines", path.display(), count);
    }

    #[tokio::test]
    async fn test_health() {
        let dir = TempDir::new().unwrap();
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = send(router(state(&dir, 1024)), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "active");

        let lines = wait_for_lines(&dir.path().join(NODE_PASSIVE_LOG.file_name), 2).await;
        assert!(lines[1].ends_with(",Health check received"));
    }

    #[tokio::test]
    async fn test_receive_logs_interaction() {
        let dir = TempDir::new().unwrap();
        let request = Request::builder()
            .method("POST")
            .uri("/receive")
            .body(Body::from("hello, node"))
            .unwrap();
        let (status, body) = send(router(state(&dir, 1024)), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["message"], "Request received and processed");

        let lines = wait_for_lines(&dir.path().join(NODE_ACTIVE_LOG.file_name), 2).await;
        assert_eq!(lines[0], NODE_ACTIVE_LOG.header());
        let row = &lines[1];
        assert!(row.starts_with("unknown,40.000000,-73.000000,48.000000,2.000000,-1.000,"));
        assert!(row.contains("\"hello, node\""));
        assert!(row.contains(",2048,1024,50.00,"));
    }

    #[tokio::test]
    async fn test_receive_rejects_get() {
        let dir = TempDir::new().unwrap();
        let request = Request::builder().uri("/receive").body(Body::empty()).unwrap();
        let response = router(state(&dir, 1024)).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_upload_saves_file() {
        let dir = TempDir::new().unwrap();
        let (status, body) = send(
            router(state(&dir, 1024)),
            multipart_request("file", "report.txt", b"contents"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["message"], "File uploaded successfully");

        let saved = dir.path().join("uploads").join("report.txt");
        assert_eq!(body["path"], saved.display().to_string());
        assert_eq!(tokio::fs::read(&saved).await.unwrap(), b"contents");
    }

    #[tokio::test]
    async fn test_upload_strips_directories() {
        let dir = TempDir::new().unwrap();
        let (status, _) = send(
            router(state(&dir, 1024)),
            multipart_request("file", "../../etc/evil.txt", b"x"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(dir.path().join("uploads").join("evil.txt").exists());
    }

    #[tokio::test]
    async fn test_upload_missing_field_is_400() {
        let dir = TempDir::new().unwrap();
        let (status, body) = send(
            router(state(&dir, 1024)),
            multipart_request("attachment", "a.txt", b"x"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_request");
    }

    #[tokio::test]
    async fn test_upload_oversize_is_400() {
        let dir = TempDir::new().unwrap();
        let (status, _) = send(
            router(state(&dir, 256)),
            multipart_request("file", "big.bin", &vec![7u8; 4096]),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!dir.path().join("uploads").join("big.bin").exists());
    }

    #[tokio::test]
    async fn test_upload_not_multipart_is_400() {
        let dir = TempDir::new().unwrap();
        let request = Request::builder()
            .method("POST")
            .uri("/upload")
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let (status, _) = send(router(state(&dir, 1024)), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_storage_failure_is_500() {
        let dir = TempDir::new().unwrap();
        let mut state = state(&dir, 1024);
        // A regular file where the upload directory should be
        let blocker = dir.path().join("blocker");
        tokio::fs::write(&blocker, b"").await.unwrap();
        state.data_dir = blocker;

        let (status, body) = send(router(state), multipart_request("file", "a.txt", b"x")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "upload_failed");
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("a.txt").as_deref(), Some("a.txt"));
        assert_eq!(sanitize_file_name("dir/sub/a.txt").as_deref(), Some("a.txt"));
        assert_eq!(sanitize_file_name("C:\\temp\\a.txt").as_deref(), Some("a.txt"));
        assert_eq!(sanitize_file_name("../"), None);
        assert_eq!(sanitize_file_name(".."), None);
        assert_eq!(sanitize_file_name(""), None);
    }
}
