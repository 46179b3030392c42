//! Error types for the Geo Directory
//!
//! Provides structured error types for the directory service, node registry,
//! notification dispatch and worker node startup.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for the directory and worker node
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Request Errors
    // =========================================================================
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Payload too large: limit is {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Upload failed: {0}")]
    Upload(String),

    // =========================================================================
    // Selection Errors
    // =========================================================================
    #[error("No active nodes found")]
    NoActiveNodes,

    // =========================================================================
    // External Dependency Errors
    // =========================================================================
    #[error("Dependency {service} failed: {reason}")]
    Dependency { service: String, reason: String },

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a dependency error for an external lookup service
    pub fn dependency(service: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::Dependency {
            service: service.into(),
            reason: reason.to_string(),
        }
    }

    /// HTTP status returned to callers for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) | Error::PayloadTooLarge { .. } => StatusCode::BAD_REQUEST,
            Error::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Error::Dependency { .. } | Error::Http(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Error::Internal(_) => "internal_error",
            Error::Configuration(_) => "configuration_error",
            Error::Validation(_) => "invalid_request",
            Error::MethodNotAllowed(_) => "method_not_allowed",
            Error::PayloadTooLarge { .. } => "payload_too_large",
            Error::Upload(_) => "upload_failed",
            Error::NoActiveNodes => "no_active_nodes",
            Error::Dependency { .. } => "dependency_failed",
            Error::Http(_) => "http_error",
            Error::JsonParse(_) => "json_parse_error",
            Error::Io(_) => "io_error",
        }
    }

    /// Check if this error is caused by the caller's input
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// API error response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let body = ApiErrorResponse {
            error: self.code().into(),
            message: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;
