//! API error types and responses.
//!
//! This module defines the standard error format for all API responses.

use axum::extract::rejection::{FormRejection, JsonRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use keygate_auth::AuthError;

/// API error type that implements `IntoResponse`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The bearer token was missing or failed verification.
    #[error("unauthorized")]
    Unauthorized {
        /// Machine-readable rejection reason.
        reason: String,
    },

    /// The identity provider refused the supplied credentials.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The identity provider refused to create the user.
    #[error("Cannot create user")]
    RegistrationFailed,

    /// The identity provider refused the refresh token.
    #[error("Cannot refresh token")]
    RefreshFailed,

    /// Invalid request body or parameters.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

/// Error details.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl ApiError {
    /// Get the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized { .. } | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::RegistrationFailed | Self::RefreshFailed | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "unauthorized",
            Self::InvalidCredentials => "invalid_credentials",
            Self::RegistrationFailed => "registration_failed",
            Self::RefreshFailed => "refresh_failed",
            Self::BadRequest(_) => "bad_request",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();
        let reason = match self {
            Self::Unauthorized { reason } => Some(reason),
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code,
                message,
                reason,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::KeyResolution(_) => {
                tracing::warn!(error = %err, "Bearer token key could not be resolved");
                Self::Unauthorized {
                    reason: err.reason(),
                }
            }
            AuthError::MissingToken
            | AuthError::InvalidToken(_)
            | AuthError::UnsupportedAlgorithm(_)
            | AuthError::InvalidSignature
            | AuthError::ClaimMismatch(_) => Self::Unauthorized {
                reason: err.reason(),
            },
            AuthError::InvalidCredentials => Self::InvalidCredentials,
            AuthError::RegistrationFailed(_) => Self::RegistrationFailed,
            AuthError::RefreshFailed(_) => Self::RefreshFailed,
            AuthError::Internal(msg) => {
                tracing::error!(error = %msg, "Auth internal error");
                Self::Internal("authentication service error".to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<FormRejection> for ApiError {
    fn from(rejection: FormRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}
