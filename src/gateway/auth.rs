//! Bearer authentication gate
//!
//! Guards the configured protected path prefixes. Depending on the mode:
//! - `oauth2`: requires `Authorization: Bearer <token>`, resolves the token to
//!   backend credentials and binds them to the request
//! - `static`: binds the configured backend credentials to every request

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{debug, error, warn};

use super::credentials::{CredentialContext, CredentialSource};
use crate::config::AuthMode;
use crate::oauth::{
    Credentials, OAuth2Service, OAuthError,
    audit::{self, AuditEvent},
};

/// Path of the protected-resource metadata document.
pub const RESOURCE_METADATA_PATH: &str = "/.well-known/oauth-protected-resource";

/// Resolved gate configuration
pub struct AuthGate {
    mode: AuthMode,
    protected_paths: Vec<String>,
    oauth: Option<Arc<OAuth2Service>>,
    static_credentials: Option<Credentials>,
    resource_metadata_url: String,
}

impl AuthGate {
    /// Gate that binds fixed credentials to every request.
    #[must_use]
    pub fn static_mode(credentials: Credentials, protected_paths: Vec<String>) -> Self {
        Self {
            mode: AuthMode::Static,
            protected_paths,
            oauth: None,
            static_credentials: Some(credentials),
            resource_metadata_url: String::new(),
        }
    }

    /// Gate that resolves bearer tokens through `service`.
    #[must_use]
    pub fn oauth2(
        service: Arc<OAuth2Service>,
        protected_paths: Vec<String>,
        public_url: &str,
    ) -> Self {
        Self {
            mode: AuthMode::OAuth2,
            protected_paths,
            oauth: Some(service),
            static_credentials: None,
            resource_metadata_url: format!(
                "{}{RESOURCE_METADATA_PATH}",
                public_url.trim_end_matches('/')
            ),
        }
    }

    /// Active mode.
    #[must_use]
    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    /// Whether `path` equals a protected prefix or lies below one.
    /// `/mcp` protects `/mcp` and `/mcp/x`, not `/mcpx`.
    #[must_use]
    pub fn is_protected(&self, path: &str) -> bool {
        self.protected_paths.iter().any(|p| {
            let p = p.trim_end_matches('/');
            path == p
                || path
                    .strip_prefix(p)
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    /// `WWW-Authenticate` challenge for a refused bearer token.
    #[must_use]
    pub fn challenge(&self) -> String {
        format!(
            r#"Bearer error="invalid_token", resource_metadata="{}""#,
            self.resource_metadata_url
        )
    }
}

/// Authentication middleware
pub async fn bearer_auth_middleware(
    State(gate): State<Arc<AuthGate>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if let Some(ref credentials) = gate.static_credentials {
        request.extensions_mut().insert(CredentialContext::new(
            credentials.clone(),
            CredentialSource::Static,
        ));
        return next.run(request).await;
    }

    let path = request.uri().path().to_owned();
    if !gate.is_protected(&path) {
        return next.run(request).await;
    }

    let Some(ref service) = gate.oauth else {
        error!("OAuth2 gate has no service configured");
        return server_error_response();
    };

    let Some(token) = bearer_token(&request) else {
        warn!(path = %path, "Missing or malformed Authorization header");
        audit::emit(&AuditEvent::token_rejected("missing_bearer"));
        return unauthorized_response(&gate);
    };

    match service.validate_access_token(token).await {
        Ok(Some(credentials)) => {
            debug!(login = %credentials.login, path = %path, "Authenticated request");
            request
                .extensions_mut()
                .insert(CredentialContext::new(credentials, CredentialSource::Bearer));
            next.run(request).await
        }
        Ok(None) => {
            warn!(path = %path, "Invalid or expired bearer token");
            audit::emit(&AuditEvent::token_rejected("unknown_or_expired"));
            unauthorized_response(&gate)
        }
        Err(e) => {
            error!(error = %e, "Token validation failed");
            server_error_response()
        }
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
/// The scheme is case-insensitive; an empty token counts as absent.
fn bearer_token(request: &Request<Body>) -> Option<&str> {
    let value = request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Create a 401 Unauthorized response
fn unauthorized_response(gate: &AuthGate) -> Response {
    let err = OAuthError::InvalidToken;
    (
        err.status(),
        [(header::WWW_AUTHENTICATE, gate.challenge())],
        Json(json!({
            "error": err.error_code(),
            "error_description": err.to_string(),
        })),
    )
        .into_response()
}

fn server_error_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "server_error" })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::TokenLifetimes;

    fn oauth_gate() -> AuthGate {
        AuthGate::oauth2(
            Arc::new(OAuth2Service::in_memory(TokenLifetimes::default())),
            vec!["/mcp".to_string()],
            "https://proxy.example.com/",
        )
    }

    #[test]
    fn protected_prefix_matching_is_segment_aware() {
        let gate = oauth_gate();
        assert!(gate.is_protected("/mcp"));
        assert!(gate.is_protected("/mcp/"));
        assert!(gate.is_protected("/mcp/tools/call"));
        assert!(!gate.is_protected("/mcpx"));
        assert!(!gate.is_protected("/health"));
        assert!(!gate.is_protected("/"));
    }

    #[test]
    fn trailing_slash_in_config_is_ignored() {
        let gate = AuthGate::static_mode(Credentials::new("u", "p"), vec!["/api/".to_string()]);
        assert!(gate.is_protected("/api"));
        assert!(gate.is_protected("/api/v1"));
        assert!(!gate.is_protected("/apis"));
    }

    #[test]
    fn challenge_points_at_metadata_document() {
        assert_eq!(
            oauth_gate().challenge(),
            r#"Bearer error="invalid_token", resource_metadata="https://proxy.example.com/.well-known/oauth-protected-resource""#
        );
    }

    #[test]
    fn bearer_token_parsing() {
        let req = |v: &str| {
            Request::builder()
                .header(header::AUTHORIZATION, v)
                .body(Body::empty())
                .unwrap()
        };
        assert_eq!(bearer_token(&req("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&req("bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&req("Basic dXNlcjpwdw==")), None);
        assert_eq!(bearer_token(&req("Bearer ")), None);
        assert_eq!(bearer_token(&req("Bearer")), None);
        assert_eq!(
            bearer_token(&Request::builder().body(Body::empty()).unwrap()),
            None
        );
    }

    #[test]
    fn unauthorized_response_carries_challenge() {
        let gate = oauth_gate();
        let resp = unauthorized_response(&gate);
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let header = resp.headers().get(header::WWW_AUTHENTICATE).unwrap();
        assert!(header.to_str().unwrap().contains("resource_metadata="));
    }
}
