use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;

use crate::accounts::{AccountError, INVALID_CREDENTIALS};
use crate::db::RecordError;
use crate::password::PasswordError;

use super::responses::ErrorResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("username or email already exists")]
    Conflict,
    #[error("{0}")]
    BadRequest(&'static str),
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("{0}")]
    NotFound(&'static str),
    #[error("internal server error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Conflict | ApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Internal causes are logged here and never reach the response body.
impl From<AccountError> for ApiError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::Validation(message) => ApiError::Validation(message),
            AccountError::Conflict => ApiError::Conflict,
            AccountError::Unauthorized => ApiError::Unauthorized(INVALID_CREDENTIALS),
            AccountError::Storage(source) => {
                error!(error = %source, "account storage failure");
                ApiError::Internal
            }
            AccountError::Internal(detail) => {
                error!(error = %detail, "account operation failed");
                ApiError::Internal
            }
        }
    }
}

impl From<RecordError> for ApiError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::NotFound(message) => ApiError::NotFound(message),
            RecordError::Database(source) => {
                error!(error = %source, "storage failure");
                ApiError::Internal
            }
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        error!(error = %err, "password hashing failed");
        ApiError::Internal
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(ErrorResponse {
            status: status.as_u16(),
            message: self.to_string(),
        });
        (status, body).into_response()
    }
}
