use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::backend::BackendError;
use crate::preferences::PreferenceError;
use crate::utils::{error_codes, error_to_api_response};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("sign in required")]
    Unauthorized,

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("request already {current}, cannot be {requested}")]
    InvalidTransition { current: String, requested: String },

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Preferences(#[from] PreferenceError),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, i32) {
        match self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, error_codes::AUTH_FAILED),
            AppError::PermissionDenied(_) => {
                (StatusCode::FORBIDDEN, error_codes::PERMISSION_DENIED)
            }
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, error_codes::NOT_FOUND),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, error_codes::VALIDATION_ERROR),
            AppError::InvalidTransition { .. } => {
                (StatusCode::CONFLICT, error_codes::INVALID_TRANSITION)
            }
            AppError::Backend(BackendError::NotFound { .. }) => {
                (StatusCode::NOT_FOUND, error_codes::NOT_FOUND)
            }
            AppError::Backend(BackendError::PermissionDenied(_)) => {
                (StatusCode::FORBIDDEN, error_codes::PERMISSION_DENIED)
            }
            AppError::Backend(_) | AppError::Preferences(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, error_codes::INTERNAL_ERROR)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        (status, error_to_api_response::<()>(code, self.to_string())).into_response()
    }
}
