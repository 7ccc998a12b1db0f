// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::models::NeedsConnection;

/// A failure reported by the accounting API (network, auth rejection,
/// rate limit, validation fault).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct RemoteServiceError {
    /// HTTP status, if a response was received at all
    pub status: Option<u16>,
    /// Provider fault code (e.g. "6240") or a local classification
    pub code: Option<String>,
    pub message: String,
}

impl RemoteServiceError {
    pub const UNAUTHORIZED: &'static str = "unauthorized";
    pub const RATE_LIMITED: &'static str = "rate_limited";
    pub const TRANSPORT: &'static str = "transport";
    /// QuickBooks fault code for "Object Not Found"
    pub const OBJECT_NOT_FOUND: &'static str = "610";

    pub fn new(status: Option<u16>, code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    /// Failure before any HTTP response was received.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(None, Some(Self::TRANSPORT.to_string()), message)
    }

    /// The entity does not exist (HTTP 404 or fault 610).
    pub fn is_not_found(&self) -> bool {
        self.status == Some(404) || self.code.as_deref() == Some(Self::OBJECT_NOT_FOUND)
    }

    /// Transient failures worth retrying on idempotent reads.
    pub fn is_retryable(&self) -> bool {
        match self.status {
            None => self.code.as_deref() == Some(Self::TRANSPORT),
            Some(status) => status == 429 || status >= 500,
        }
    }
}

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid or expired OAuth state")]
    InvalidState,

    #[error("Missing required OAuth parameter: {0}")]
    MissingParameters(&'static str),

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Refresh token expired")]
    RefreshTokenExpired,

    #[error("Access token expired")]
    AccessTokenExpired,

    #[error("Connection required: {0}")]
    NotConnected(NeedsConnection),

    #[error("Remote service error: {0}")]
    Remote(#[from] RemoteServiceError),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// True for a provider response rejecting our credentials.
    pub fn is_remote_auth_error(&self) -> bool {
        matches!(self, AppError::Remote(e) if e.status == Some(401)
            || e.code.as_deref() == Some(RemoteServiceError::UNAUTHORIZED))
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::InvalidState => (StatusCode::BAD_REQUEST, "invalid_state", None),
            AppError::MissingParameters(name) => (
                StatusCode::BAD_REQUEST,
                "missing_parameters",
                Some(name.to_string()),
            ),
            AppError::AlreadyConnected => (StatusCode::CONFLICT, "already_connected", None),
            AppError::RefreshTokenExpired => {
                (StatusCode::UNAUTHORIZED, "refresh_token_expired", None)
            }
            AppError::AccessTokenExpired => (StatusCode::UNAUTHORIZED, "access_token_expired", None),
            AppError::NotConnected(reason) => (
                StatusCode::UNAUTHORIZED,
                "connection_required",
                Some(reason.as_str().to_string()),
            ),
            AppError::Remote(err) => {
                tracing::error!(error = %err, code = ?err.code, status = ?err.status, "Remote service error");
                (StatusCode::BAD_GATEWAY, "remote_service_error", None)
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", Some(msg.clone())),
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Logging and redaction policy for errors that reach a user-facing boundary.
#[derive(Debug, Clone, Copy)]
pub struct ErrorPolicy {
    pub log_errors: bool,
    pub show_detailed_errors: bool,
}

impl ErrorPolicy {
    /// Log `err` under `context` if error logging is enabled.
    pub fn report(&self, context: &str, err: &AppError) {
        if !self.log_errors {
            return;
        }
        match err {
            AppError::Remote(remote) => tracing::error!(
                error = %remote,
                code = ?remote.code,
                status = ?remote.status,
                "{}",
                context
            ),
            other => tracing::error!(error = %other, "{}", context),
        }
    }

    /// Text safe to show an end user. Raw provider text only when detailed
    /// errors are enabled.
    pub fn public_message(&self, err: &AppError, fallback: &str) -> String {
        if self.show_detailed_errors {
            err.to_string()
        } else {
            fallback.to_string()
        }
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
