//! Protocol errors and their HTTP rendering.

use axum::{
    Json,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{CACHE_CONTROL, PRAGMA, WWW_AUTHENTICATE},
    },
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("client authentication failed")]
    InvalidClient,
    #[error("redirect_uri does not match the registered value")]
    InvalidRedirect,
    #[error("{0}")]
    InvalidGrant(String),
    #[error("{0}")]
    InvalidRequest(String),
    #[error("grant_type is not supported")]
    UnsupportedGrantType,
    #[error("response_type is not supported")]
    UnsupportedResponseType,
    #[error("{0}")]
    AccessDenied(String),
    #[error("{0}")]
    InvalidToken(String),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Error body returned by every endpoint.
#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
    pub error_description: String,
}

impl OAuthError {
    /// Wrap an unexpected failure. The cause is logged, never returned.
    pub fn internal(err: impl Display) -> Self {
        Self::Internal(err.to_string())
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidClient | Self::AccessDenied(_) | Self::InvalidToken(_) => {
                StatusCode::UNAUTHORIZED
            }
            Self::InvalidRedirect
            | Self::InvalidGrant(_)
            | Self::InvalidRequest(_)
            | Self::UnsupportedGrantType
            | Self::UnsupportedResponseType => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// RFC 6749 error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidClient => "invalid_client",
            Self::InvalidRedirect | Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidGrant(_) => "invalid_grant",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::UnsupportedResponseType => "unsupported_response_type",
            Self::AccessDenied(_) => "access_denied",
            Self::InvalidToken(_) => "invalid_token",
            Self::Internal(_) => "server_error",
        }
    }

    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::Internal(_) => "the server encountered an unexpected condition".to_string(),
            other => other.to_string(),
        }
    }

    #[must_use]
    pub fn to_body(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.code().to_string(),
            error_description: self.description(),
        }
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        if let Self::Internal(cause) = &self {
            error!("Request failed: {cause}");
        }

        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        if matches!(self, Self::InvalidClient) {
            headers.insert(
                WWW_AUTHENTICATE,
                HeaderValue::from_static("Basic realm=\"grantor\""),
            );
        }

        (self.status(), headers, Json(self.to_body())).into_response()
    }
}
