use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::StorageError;
use sea_orm::DbErr;
use serde::Serialize;

/// Structured error response returned by all endpoints on failure.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Machine-readable error code. One of: `VALIDATION_ERROR`,
    /// `TOKEN_INVALID`, `INTEGRITY_ERROR`, `NOT_FOUND`, `STORAGE_ERROR`,
    /// `INTERNAL_ERROR`.
    #[schema(example = "INTEGRITY_ERROR")]
    pub code: &'static str,
    /// Human-readable error description.
    #[schema(example = "digest mismatch: upload discarded")]
    pub message: String,
}

/// Application-level error type.
#[derive(Debug)]
pub enum AppError {
    Validation(String),
    /// Malformed, expired, tampered, or wrong-method capability token.
    TokenInvalid,
    /// Declared size or digest disagreed with the received bytes. The
    /// unpromoted temp artifact has already been deleted when this surfaces.
    Integrity(String),
    NotFound(String),
    Storage(StorageError),
    Internal(String),
}

impl AppError {
    fn status_and_body(self) -> (StatusCode, ErrorBody) {
        match self {
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    code: "VALIDATION_ERROR",
                    message: msg,
                },
            ),
            AppError::TokenInvalid => (
                StatusCode::FORBIDDEN,
                ErrorBody {
                    code: "TOKEN_INVALID",
                    message: "Invalid capability token".into(),
                },
            ),
            AppError::Integrity(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    code: "INTEGRITY_ERROR",
                    message: msg,
                },
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    code: "NOT_FOUND",
                    message: msg,
                },
            ),
            AppError::Storage(err) => {
                if let StorageError::NotFound(key) = &err {
                    return (
                        StatusCode::NOT_FOUND,
                        ErrorBody {
                            code: "NOT_FOUND",
                            message: format!("No object stored under '{key}'"),
                        },
                    );
                }
                tracing::error!("Storage backend error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        code: "STORAGE_ERROR",
                        message: "Storage backend failure".into(),
                    },
                )
            }
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {detail}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        code: "INTERNAL_ERROR",
                        message: "An unexpected error occurred".into(),
                    },
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        (status, Json(body)).into_response()
    }
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        AppError::Storage(err)
    }
}
