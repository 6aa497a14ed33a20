use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use burrow_storage::StorageError;
use thiserror::Error;
use tracing::{debug, error};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Storage(err) => match err {
                StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                StorageError::Gone(_) => StatusCode::GONE,
                StorageError::DuplicateUrl { .. } | StorageError::IdConflict(_) => {
                    StatusCode::CONFLICT
                }
                StorageError::Unavailable(_) | StorageError::Timeout(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            AppError::Storage(err) if !err.is_expected() => {
                error!(status = status.as_u16(), error = %self, "request failed");
            }
            _ => debug!(status = status.as_u16(), error = %self, "request rejected"),
        }
        (status, self.to_string()).into_response()
    }
}
