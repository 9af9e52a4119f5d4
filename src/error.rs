// HTTP API Error Types
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::access::AccessError;
use crate::database::{SchemaError, StoreError};
use crate::services::SyncError;

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    ValidationError {
        message: String,
        field_errors: Option<HashMap<String, String>>,
    },
    InvalidJson(String),

    // 401 Unauthorized
    Unauthorized(String),
    Unauthenticated(String),

    // 404 Not Found
    NotFound(String),

    // 500 Internal Server Error
    InternalServerError(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::ValidationError { .. } => StatusCode::BAD_REQUEST,
            ApiError::InvalidJson(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::ValidationError { message, .. } => message,
            ApiError::InvalidJson(msg) => msg,
            ApiError::Unauthorized(msg) => msg,
            ApiError::Unauthenticated(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::InternalServerError(msg) => msg,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::ValidationError { .. } => "VALIDATION_ERROR",
            ApiError::InvalidJson(_) => "INVALID_JSON",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Unauthenticated(_) => "UNAUTHENTICATED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        let mut response = json!({
            "error": true,
            "message": self.message(),
            "code": self.error_code()
        });

        if let ApiError::ValidationError { field_errors: Some(field_errors), .. } = self {
            response["field_errors"] = json!(field_errors);
        }

        response
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn validation_error(message: impl Into<String>, field_errors: Option<HashMap<String, String>>) -> Self {
        ApiError::ValidationError {
            message: message.into(),
            field_errors,
        }
    }

    pub fn invalid_json(message: impl Into<String>) -> Self {
        ApiError::InvalidJson(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        ApiError::Unauthenticated(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    /// Log the real failure and return a generic 500 carrying only `message`
    pub fn upstream(message: impl Into<String>, err: impl std::fmt::Display) -> Self {
        let message = message.into();
        tracing::error!("{}: {}", message, err);
        ApiError::internal_server_error(message)
    }

    /// Map a store failure, keeping validation problems as 400s
    pub fn from_store(message: impl Into<String>, err: StoreError) -> Self {
        match err {
            StoreError::Schema(e) => e.into(),
            other => ApiError::upstream(message, other),
        }
    }
}

// Convert other error types to ApiError
impl From<SchemaError> for ApiError {
    fn from(err: SchemaError) -> Self {
        let field = match &err {
            SchemaError::UnknownColumn { column, .. }
            | SchemaError::TypeMismatch { column, .. }
            | SchemaError::NullNotAllowed { column, .. }
            | SchemaError::MissingColumn { column, .. } => column.clone(),
        };
        let mut field_errors = HashMap::new();
        field_errors.insert(field, err.to_string());
        ApiError::validation_error("Invalid field format", Some(field_errors))
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::from_store("An error occurred while processing your request", err)
    }
}

impl From<AccessError> for ApiError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::InvalidWorkspaceId | AccessError::InvalidResourceId(_) => ApiError::bad_request(err.to_string()),
            AccessError::Unauthorized => ApiError::unauthorized(err.to_string()),
            AccessError::Unauthenticated(msg) => ApiError::unauthenticated(msg),
            AccessError::Upstream(e) => ApiError::upstream("Internal server error", e),
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::InvalidRecord { index, source } => {
                let mut field_errors = HashMap::new();
                field_errors.insert(format!("[{}]", index), source.to_string());
                ApiError::validation_error("Invalid record in sync input", Some(field_errors))
            }
            SyncError::ForeignWorkspace { .. } | SyncError::DuplicateId(_) => ApiError::validation_error(err.to_string(), None),
            SyncError::Unsupported(_) => ApiError::upstream("Something went wrong", err),
            SyncError::Store(e) => ApiError::from_store("Something went wrong", e),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        ApiError::invalid_json(err.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(err: QueryRejection) -> Self {
        ApiError::bad_request(err.body_text())
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status_code(), Json(self.to_json())).into_response()
    }
}

impl IntoResponse for AccessError {
    fn into_response(self) -> axum::response::Response {
        ApiError::from(self).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn access_errors_map_to_distinct_statuses() {
        assert_eq!(ApiError::from(AccessError::InvalidWorkspaceId).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::from(AccessError::InvalidResourceId("group")).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::from(AccessError::Unauthorized).status_code(), StatusCode::UNAUTHORIZED);
        let unauthenticated = ApiError::from(AccessError::Unauthenticated("Missing session".into()));
        assert_eq!(unauthenticated.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(unauthenticated.error_code(), "UNAUTHENTICATED");
        let upstream = ApiError::from(AccessError::Upstream(StoreError::Unavailable("db down".into())));
        assert_eq!(upstream.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn upstream_detail_is_not_echoed() {
        let err = ApiError::from(StoreError::Unavailable("password=hunter2".into()));
        assert!(!err.to_json().to_string().contains("hunter2"));
    }

    #[test]
    fn sync_policy_violation_is_a_server_error() {
        let err = ApiError::from(SyncError::Store(StoreError::PolicyViolation { table: "workspace_users", operation: "upsert" }));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message(), "Something went wrong");
        let err = ApiError::from(SyncError::DuplicateId(Uuid::nil()));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
