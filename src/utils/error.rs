//! Error handling module
//!
//! Defines error types and handling logic used in the project

use crate::models::openai::{ErrorDetail, ErrorResponse};
use axum::http::StatusCode;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    /// I/O failure while reading a body
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Client request body is malformed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Backend response body is malformed
    #[error("Invalid backend response: {0}")]
    InvalidResponse(String),

    /// Request path does not map to a supported endpoint
    #[error("Unsupported endpoint: {0}")]
    UnsupportedEndpoint(String),

    /// No translator exists for the endpoint/backend pair
    #[error("Unsupported conversion: {0}")]
    UnsupportedConversion(String),

    /// Selected backend is not configured
    #[error("Backend not found: {0}")]
    BackendNotFound(String),

    /// Phase events arrived out of order
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::UnsupportedEndpoint(_) => StatusCode::NOT_FOUND,
            AppError::BackendNotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidResponse(_) => StatusCode::BAD_GATEWAY,
            AppError::Config(_)
            | AppError::Io(_)
            | AppError::Serialization(_)
            | AppError::UnsupportedConversion(_)
            | AppError::ProtocolViolation(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error type string
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::InvalidRequest(_) => "invalid_request_error",
            AppError::UnsupportedEndpoint(_) | AppError::BackendNotFound(_) => "not_found_error",
            AppError::UnsupportedConversion(_) => "invalid_request_error",
            AppError::InvalidResponse(_) => "upstream_error",
            AppError::Config(_)
            | AppError::Io(_)
            | AppError::Serialization(_)
            | AppError::ProtocolViolation(_)
            | AppError::Internal(_) => "api_error",
        }
    }

    /// Whether the error originates from the client payload
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Convert to the canonical error envelope returned to clients
    pub fn to_openai_error(&self) -> ErrorResponse {
        ErrorResponse {
            response_type: Some("error".to_string()),
            error: ErrorDetail {
                error_type: self.error_type().to_string(),
                message: self.to_string(),
                param: None,
                code: Some(self.status_code().as_u16().to_string()),
            },
        }
    }
}

/// Result type alias
pub type AppResult<T> = Result<T, AppError>;

/// Error handling helper functions
pub mod helpers {
    use super::*;

    /// Create invalid request error
    pub fn invalid_request(message: impl Into<String>) -> AppError {
        AppError::InvalidRequest(message.into())
    }

    /// Create invalid backend response error
    pub fn invalid_response(message: impl Into<String>) -> AppError {
        AppError::InvalidResponse(message.into())
    }

    /// Create unsupported conversion error
    pub fn unsupported_conversion(message: impl Into<String>) -> AppError {
        AppError::UnsupportedConversion(message.into())
    }

    /// Create protocol violation error
    pub fn protocol_violation(message: impl Into<String>) -> AppError {
        AppError::ProtocolViolation(message.into())
    }

    /// Create internal error
    pub fn internal_error(message: impl Into<String>) -> AppError {
        AppError::Internal(message.into())
    }
}

/// Error context extension trait
pub trait ErrorContext<T> {
    /// Add invalid request context
    fn invalid_request_context(self, message: &str) -> AppResult<T>;

    /// Add invalid backend response context
    fn invalid_response_context(self, message: &str) -> AppResult<T>;

    /// Add internal error context
    fn internal_context(self, message: &str) -> AppResult<T>;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn invalid_request_context(self, message: &str) -> AppResult<T> {
        self.map_err(|e| AppError::InvalidRequest(format!("{}: {}", message, e)))
    }

    fn invalid_response_context(self, message: &str) -> AppResult<T> {
        self.map_err(|e| AppError::InvalidResponse(format!("{}: {}", message, e)))
    }

    fn internal_context(self, message: &str) -> AppResult<T> {
        self.map_err(|e| AppError::Internal(format!("{}: {}", message, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(AppError::InvalidRequest("test".to_string()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::InvalidResponse("test".to_string()).status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(AppError::UnsupportedEndpoint("test".to_string()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Internal("test".to_string()).status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_openai_error_conversion() {
        let app_error = AppError::InvalidRequest("missing model".to_string());
        let envelope = app_error.to_openai_error();

        assert_eq!(envelope.response_type.as_deref(), Some("error"));
        assert_eq!(envelope.error.error_type, "invalid_request_error");
        assert_eq!(envelope.error.message, "Invalid request: missing model");
        assert_eq!(envelope.error.code.as_deref(), Some("400"));
    }

    #[test]
    fn test_error_context() {
        let result: Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "body truncated"
        ));

        let app_result = result.invalid_response_context("failed to read response body");

        if let Err(AppError::InvalidResponse(msg)) = app_result {
            assert!(msg.contains("failed to read response body"));
            assert!(msg.contains("body truncated"));
        } else {
            panic!("Expected invalid response error");
        }
    }
}
