//! Request-scoped backend credentials
//!
//! The auth gate inserts a [`CredentialContext`] into the request extensions;
//! handlers extract it. Each request carries its own copy, so concurrent
//! requests never observe each other's identity.

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::Value;
use tracing::error;

use crate::error::{rpc_codes, rpc_error_body};
use crate::oauth::Credentials;

/// Where the bound credentials came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Configured backend username/password
    Static,
    /// Resolved from an OAuth2 bearer token
    Bearer,
}

/// Backend identity bound to one request.
#[derive(Debug, Clone)]
pub struct CredentialContext {
    credentials: Credentials,
    source: CredentialSource,
}

impl CredentialContext {
    /// Bind `credentials` obtained from `source`.
    #[must_use]
    pub fn new(credentials: Credentials, source: CredentialSource) -> Self {
        Self {
            credentials,
            source,
        }
    }

    /// The bound credentials.
    #[must_use]
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// How the credentials were resolved.
    #[must_use]
    pub fn source(&self) -> CredentialSource {
        self.source
    }
}

impl<S> FromRequestParts<S> for CredentialContext
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Self>().cloned().ok_or_else(|| {
            // Reaching a credential-consuming handler without a bound identity
            // means the route is not covered by the gate.
            error!(path = %parts.uri.path(), "No backend credentials bound to request");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(rpc_error_body(
                    rpc_codes::INTERNAL_ERROR,
                    "No backend credentials bound to this request",
                    Value::Null,
                )),
            )
                .into_response()
        })
    }
}
