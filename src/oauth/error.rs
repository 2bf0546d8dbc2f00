//! OAuth2 protocol errors as seen by clients.

use axum::http::StatusCode;
use thiserror::Error;

/// Generic description for every failed grant. Which check failed (unknown,
/// expired, consumed, redirect mismatch, PKCE mismatch) is never revealed.
pub const INVALID_GRANT_DESCRIPTION: &str =
    "The provided authorization grant or refresh token is invalid, expired or revoked";

/// Client-facing authorization failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OAuthError {
    /// Missing or malformed parameter
    #[error("{0}")]
    InvalidRequest(String),

    /// Code or refresh token unusable
    #[error("The provided authorization grant or refresh token is invalid, expired or revoked")]
    InvalidGrant,

    /// `grant_type` other than `authorization_code` / `refresh_token`
    #[error("Unsupported grant_type: {0}")]
    UnsupportedGrantType(String),

    /// `response_type` other than `code`
    #[error("Unsupported response_type: {0}")]
    UnsupportedResponseType(String),

    /// Bearer token missing, unknown or expired
    #[error("The access token is missing, invalid or expired")]
    InvalidToken,

    /// Backend refused the submitted login/password
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// Backend could not be reached to check credentials
    #[error("Backend unavailable: {0}")]
    UpstreamUnavailable(String),

    /// `code_challenge_method` other than `S256`
    #[error("Unsupported code_challenge_method: {0}")]
    UnsupportedChallengeMethod(String),
}

impl OAuthError {
    /// RFC 6749 `error` code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) | Self::UnsupportedChallengeMethod(_) => "invalid_request",
            Self::InvalidGrant => "invalid_grant",
            Self::UnsupportedGrantType(_) => "unsupported_grant_type",
            Self::UnsupportedResponseType(_) => "unsupported_response_type",
            Self::InvalidToken => "invalid_token",
            Self::InvalidCredentials => "access_denied",
            Self::UpstreamUnavailable(_) => "temporarily_unavailable",
        }
    }

    /// HTTP status for this failure.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_)
            | Self::InvalidGrant
            | Self::UnsupportedGrantType(_)
            | Self::UnsupportedResponseType(_)
            | Self::UnsupportedChallengeMethod(_) => StatusCode::BAD_REQUEST,
            Self::InvalidToken | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Shorthand for a missing required parameter.
    #[must_use]
    pub fn missing(param: &str) -> Self {
        Self::InvalidRequest(format!("Missing required parameter: {param}"))
    }
}
