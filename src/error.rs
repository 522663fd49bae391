//! Error handling module
//!
//! Provides unified error types and handling for the entire application.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Application-wide error type.
///
/// Extraction and quality failures are recoverable: they abort the current
/// pipeline run and are retried only by a later manual or scheduled sync.
/// Storage failures are fatal for the run. Doc-gen dispatch failures are
/// logged by the orchestrator and never surfaced to callers.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Schema extraction failed upstream: {0}")]
    UpstreamExtraction(String),

    #[error("Quality analysis failed upstream: {0}")]
    UpstreamQuality(String),

    #[error("Chat failed upstream: {0}")]
    UpstreamChat(String),

    #[error("Storage unavailable: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Doc generation dispatch failed: {0}")]
    DocGenDispatch(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match &self {
            AppError::UpstreamExtraction(detail) => (
                StatusCode::BAD_GATEWAY,
                "UPSTREAM_EXTRACTION_ERROR",
                "Schema extraction failed".to_string(),
                Some(detail.clone()),
            ),
            AppError::UpstreamQuality(detail) => (
                StatusCode::BAD_GATEWAY,
                "UPSTREAM_QUALITY_ERROR",
                "Quality analysis failed".to_string(),
                Some(detail.clone()),
            ),
            AppError::UpstreamChat(detail) => (
                StatusCode::BAD_GATEWAY,
                "UPSTREAM_CHAT_ERROR",
                "Chat request failed".to_string(),
                Some(detail.clone()),
            ),
            AppError::Storage(detail) => {
                error!("Storage error: {}", detail);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "STORAGE_UNAVAILABLE",
                    "Storage is unavailable".to_string(),
                    Some(detail.clone()),
                )
            }
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                msg.clone(),
                None,
            ),
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                msg.clone(),
                None,
            ),
            AppError::DocGenDispatch(detail) => {
                // Doc generation is best-effort; this only reaches a response
                // if a route exposes the dispatch directly.
                error!("Doc-gen dispatch error: {}", detail);
                (
                    StatusCode::BAD_GATEWAY,
                    "DOC_GEN_DISPATCH_ERROR",
                    "Documentation generation could not be started".to_string(),
                    Some(detail.clone()),
                )
            }
            AppError::Config(msg) => {
                error!("Configuration error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CONFIG_ERROR",
                    "A configuration error occurred".to_string(),
                    Some(msg.clone()),
                )
            }
        };

        let body = Json(ErrorResponse {
            success: false,
            message,
            error: details,
            code: Some(error_code.to_string()),
        });

        (status, body).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, AppError>;
