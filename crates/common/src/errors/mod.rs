//! Error types for PaperLens services
//!
//! Provides a single error enum shared by every pipeline stage with:
//! - Distinct variants for retryable and fatal failures
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    InvalidTransition,

    // Isolation errors (3xxx)
    WorkspaceIsolationViolation,

    // Resource errors (4xxx)
    NotFound,
    EmptyContext,

    // Conflict errors (5xxx)
    QueryInProgress,
    Cancelled,

    // Database errors (7xxx)
    DatabaseError,
    ConnectionError,

    // External service errors (8xxx)
    NetworkError,
    SchemaValidationError,
    UpstreamError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::InvalidTransition => 1002,

            ErrorCode::WorkspaceIsolationViolation => 3001,

            ErrorCode::NotFound => 4001,
            ErrorCode::EmptyContext => 4002,

            ErrorCode::QueryInProgress => 5001,
            ErrorCode::Cancelled => 5002,

            ErrorCode::DatabaseError => 7001,
            ErrorCode::ConnectionError => 7002,

            ErrorCode::NetworkError => 8001,
            ErrorCode::SchemaValidationError => 8002,
            ErrorCode::UpstreamError => 8003,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Invalid progress transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    // Resource errors
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    #[error("No section summaries available for {document_count} document(s)")]
    EmptyContext { document_count: usize },

    /// Data surfaced outside the caller's authorized document set.
    #[error("Workspace isolation violation: {message}")]
    WorkspaceIsolationViolation { message: String },

    // Conflict errors
    #[error("A query is already in progress for conversation {conversation_id}")]
    QueryInProgress { conversation_id: String },

    #[error("Query execution was cancelled")]
    Cancelled,

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    // External service errors
    #[error("Network error calling {service}: {message}")]
    Network { service: String, message: String },

    #[error("Schema validation failed for {service} response: {message}")]
    SchemaValidation { service: String, message: String },

    #[error("{service} rejected the request with status {status}: {message}")]
    Upstream {
        service: String,
        status: u16,
        message: String,
    },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::EmptyContext { .. } => ErrorCode::EmptyContext,
            AppError::WorkspaceIsolationViolation { .. } => ErrorCode::WorkspaceIsolationViolation,
            AppError::QueryInProgress { .. } => ErrorCode::QueryInProgress,
            AppError::Cancelled => ErrorCode::Cancelled,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::Network { .. } => ErrorCode::NetworkError,
            AppError::SchemaValidation { .. } => ErrorCode::SchemaValidationError,
            AppError::Upstream { .. } => ErrorCode::UpstreamError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,

            // 404 Not Found
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::QueryInProgress { .. } | AppError::Cancelled => StatusCode::CONFLICT,

            // 422 Unprocessable Entity
            AppError::EmptyContext { .. } => StatusCode::UNPROCESSABLE_ENTITY,

            // 500 Internal Server Error
            AppError::InvalidTransition { .. }
            | AppError::WorkspaceIsolationViolation { .. }
            | AppError::Database(_)
            | AppError::DatabaseConnection { .. }
            | AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::SchemaValidation { .. }
            | AppError::Upstream { .. }
            | AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,

            // 504 Gateway Timeout
            AppError::Network { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Only transport-level failures are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Network { .. })
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Message safe to show in a conversation when a query aborts
    pub fn user_message(&self) -> String {
        match self {
            AppError::SchemaValidation { service, .. } => format!(
                "The {} service returned an unexpected response. Please try again later.",
                service
            ),
            AppError::Network { service, .. } => format!(
                "Could not reach the {} service. Please retry.",
                service
            ),
            AppError::EmptyContext { .. } => {
                "No content is available for the selected documents.".to_string()
            }
            AppError::Cancelled => "The query was cancelled.".to_string(),
            AppError::WorkspaceIsolationViolation { .. } => {
                "An internal error occurred while processing this query.".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message: self.user_message(),
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}
