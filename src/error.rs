use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use diesel::result::Error as DieselError;
use serde_json::{json, Value};
use thiserror::Error;

/// Crate-wide error for the quiz/grading services.
///
/// Validation and not-found errors carry everything the client needs;
/// database and unexpected failures are logged here and reported generically.
/// Ownership failures are deliberately raised as `NotFound` so callers cannot
/// probe for other users' resources.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{message}")]
    Validation {
        code: &'static str,
        message: String,
        details: Value,
    },
    #[error("{0}")]
    NotFound(String),
    #[error("Not logged in")]
    Unauthorized,
    #[error("Database error")]
    Database(#[from] DieselError),
    #[error("Connection pool error")]
    Pool(#[from] r2d2::Error),
    #[error("{0}")]
    Unexpected(String),
}

impl ApiError {
    pub fn validation(code: &'static str, message: impl Into<String>, details: Value) -> Self {
        ApiError::Validation {
            code,
            message: message.into(),
            details,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Validation {
                code,
                message,
                details,
            } => (
                StatusCode::BAD_REQUEST,
                json!({
                    "code": code,
                    "message": message,
                    "details": details,
                }),
            ),
            ApiError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                json!({
                    "code": "NOT_FOUND",
                    "message": message,
                }),
            ),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                json!({
                    "code": "UNAUTHORIZED",
                    "message": "Not logged in",
                }),
            ),
            ApiError::Database(e) => {
                log::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "code": "DATABASE_ERROR",
                        "message": "A database error occurred.",
                    }),
                )
            }
            ApiError::Pool(e) => {
                log::error!("Connection pool error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "code": "DATABASE_ERROR",
                        "message": "A database error occurred.",
                    }),
                )
            }
            ApiError::Unexpected(message) => {
                log::error!("Unexpected error: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "code": "SERVER_ERROR",
                        "message": "An unexpected error occurred.",
                    }),
                )
            }
        };

        let body = json!({
            "error": body,
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_keep_their_machine_readable_code() {
        let err = ApiError::validation(
            "NOT_ENOUGH_PROBLEMS",
            "Not enough problems in the selected pool.",
            json!({"available": 6, "required": 10}),
        );
        match err {
            ApiError::Validation { code, details, .. } => {
                assert_eq!(code, "NOT_ENOUGH_PROBLEMS");
                assert_eq!(details["available"], 6);
                assert_eq!(details["required"], 10);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn diesel_not_found_maps_to_database_error_not_a_panic() {
        let err: ApiError = DieselError::NotFound.into();
        assert!(matches!(err, ApiError::Database(_)));
    }
}
