//! Caller-facing error taxonomy and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::error;
use serde::Serialize;

use crate::store::StoreError;

/// Failure envelope: `{ success: false, message }`
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("{0}")]
    Validation(String),

    #[error("Invalid {kind} id: {id}")]
    InvalidIdentifier { kind: String, id: String },

    #[error("{kind} record {id} not found")]
    NotFound { kind: String, id: String },

    #[error("Unsupported media type '{mime_type}': {kind} accepts {expected} files only")]
    UnsupportedMediaType {
        kind: String,
        mime_type: String,
        expected: &'static str,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl ResourceError {
    /// Required fields that were missing or blank
    pub fn missing_fields(fields: &[&str]) -> Self {
        ResourceError::Validation(format!(
            "Missing required field(s): {}",
            fields.join(", ")
        ))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidIdentifier { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ResourceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            Self::Storage(e) => {
                error!("Storage failure: {}", e);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        let body = ErrorResponse {
            success: false,
            message,
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for repository and attachment operations.
pub type ResourceResult<T> = std::result::Result<T, ResourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ResourceError::missing_fields(&["title"]).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ResourceError::NotFound {
                kind: "faqs".into(),
                id: "x".into()
            }
            .status_code(),
            StatusCode::NOT_FOUND
        );
        let storage = ResourceError::Storage(StoreError::Io(std::io::Error::other("disk gone")));
        assert_eq!(storage.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_missing_fields_message_names_fields() {
        let err = ResourceError::missing_fields(&["title", "image"]);
        assert_eq!(err.to_string(), "Missing required field(s): title, image");
    }
}
