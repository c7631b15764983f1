use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use busline_core::CoreError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(String),
    UniquenessError(String),
    NotFoundError(String),
    ConflictError(String),
    InternalServerError(String),
}

impl AppError {
    fn kind(&self) -> &'static str {
        match self {
            AppError::AuthenticationError(_) => "AUTHENTICATION",
            AppError::AuthorizationError(_) => "AUTHORIZATION",
            AppError::ValidationError(_) => "VALIDATION",
            AppError::UniquenessError(_) => "UNIQUENESS",
            AppError::NotFoundError(_) => "NOT_FOUND",
            AppError::ConflictError(_) => "CONFLICT",
            AppError::InternalServerError(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let (status, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::UniquenessError(msg) => (StatusCode::CONFLICT, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "kind": kind,
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ValidationError(msg) => AppError::ValidationError(msg),
            CoreError::UniquenessError(msg) => AppError::UniquenessError(msg),
            CoreError::NotFoundError(msg) => AppError::NotFoundError(format!("{} not found", msg)),
            CoreError::ConflictError(msg) => AppError::ConflictError(msg),
            CoreError::StorageError(msg) => AppError::InternalServerError(msg),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}
