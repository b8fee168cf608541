//! # Error Handling Module
//!
//! Provides structured error types for MongoDeck operations.
//! Every route failure is rendered as the same JSON envelope:
//!
//! ```json
//! { "success": false, "message": "Failed to update document", "error": "..." }
//! ```

use crate::format::PrettyJson;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Result type alias for MongoDeck operations
pub type DeckResult<T> = Result<T, DeckError>;

/// Error type for all MongoDeck operations
#[derive(Error, Debug)]
pub enum DeckError {
    /// Driver, connection or server-side query errors
    #[error("Database error: {0}")]
    Database(String),

    /// JSON parsing or serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Collection name rejected by the guard
    #[error("Invalid collection name: {0}")]
    InvalidCollection(String),

    /// Script name rejected by the guard
    #[error("Invalid script name: {0}")]
    InvalidScript(String),

    /// Request body has the wrong shape
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Document or collection not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// External script failed to start, exited non-zero or timed out
    #[error("Script error: {0}")]
    Script(String),
}

impl DeckError {
    /// Returns the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            DeckError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DeckError::Json(_) => StatusCode::BAD_REQUEST,
            DeckError::InvalidCollection(_) => StatusCode::BAD_REQUEST,
            DeckError::InvalidScript(_) => StatusCode::BAD_REQUEST,
            DeckError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            DeckError::NotFound(_) => StatusCode::NOT_FOUND,
            DeckError::Script(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            DeckError::Database(_) => "DATABASE_ERROR",
            DeckError::Json(_) => "JSON_ERROR",
            DeckError::InvalidCollection(_) => "INVALID_COLLECTION",
            DeckError::InvalidScript(_) => "INVALID_SCRIPT",
            DeckError::InvalidPayload(_) => "INVALID_PAYLOAD",
            DeckError::NotFound(_) => "NOT_FOUND",
            DeckError::Script(_) => "SCRIPT_ERROR",
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        DeckError::NotFound(msg.into())
    }

    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        DeckError::InvalidPayload(msg.into())
    }

    /// Attach the failing operation's message, producing a route error
    pub fn during(self, message: impl Into<String>) -> RouteError {
        RouteError {
            message: message.into(),
            source: self,
        }
    }
}

/// Converts a bare DeckError into the envelope with a generic message
impl IntoResponse for DeckError {
    fn into_response(self) -> Response {
        self.during("Request failed").into_response()
    }
}

impl From<mongodb::error::Error> for DeckError {
    fn from(err: mongodb::error::Error) -> Self {
        DeckError::Database(err.to_string())
    }
}

impl From<mongodb::bson::extjson::de::Error> for DeckError {
    fn from(err: mongodb::bson::extjson::de::Error) -> Self {
        DeckError::InvalidPayload(err.to_string())
    }
}

impl From<mongodb::bson::oid::Error> for DeckError {
    fn from(err: mongodb::bson::oid::Error) -> Self {
        DeckError::InvalidPayload(err.to_string())
    }
}

/// A failure tied to the route operation that produced it.
#[derive(Debug)]
pub struct RouteError {
    pub message: String,
    pub source: DeckError,
}

impl RouteError {
    pub fn status_code(&self) -> StatusCode {
        self.source.status_code()
    }
}

impl std::fmt::Display for RouteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.message, self.source)
    }
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        error!(code = self.source.error_code(), "{}", self);

        let body = PrettyJson(json!({
            "success": false,
            "message": self.message,
            "error": self.source.to_string(),
        }));

        (status, body).into_response()
    }
}

/// Attaches an operation message to any `DeckResult`
pub trait ResultExt<T> {
    fn during(self, message: &str) -> Result<T, RouteError>;
}

impl<T> ResultExt<T> for DeckResult<T> {
    fn during(self, message: &str) -> Result<T, RouteError> {
        self.map_err(|e| e.during(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            DeckError::not_found("doc").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            DeckError::Database("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            DeckError::InvalidCollection("$x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn test_route_error_envelope() {
        let response = DeckError::Database("connection refused".into())
            .during("Failed to count documents")
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers()[axum::http::header::CONTENT_TYPE],
            crate::format::JSON_UTF8
        );

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(bytes.starts_with(b"{\n  \"success\": false"));
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Failed to count documents");
        assert_eq!(body["error"], "Database error: connection refused");
    }
}
