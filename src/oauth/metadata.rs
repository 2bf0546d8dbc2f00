//! OAuth Protected Resource Metadata (RFC 9728) served by this proxy.

use serde::{Deserialize, Serialize};

use super::pkce::ChallengeMethod;

/// Discovery document published at `/.well-known/oauth-protected-resource`.
///
/// The proxy is its own authorization server, so the document also advertises
/// the authorization and token endpoints directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedResourceMetadata {
    /// Protected resource identifier (the public base URL)
    pub resource: String,

    /// Authorization servers that can issue tokens for this resource
    pub authorization_servers: Vec<String>,

    /// Authorization endpoint URL
    pub authorization_endpoint: String,

    /// Token endpoint URL
    pub token_endpoint: String,

    /// Supported PKCE code challenge methods
    pub code_challenge_methods_supported: Vec<String>,

    /// Supported bearer token methods
    #[serde(default)]
    pub bearer_methods_supported: Vec<String>,

    /// Supported scopes
    #[serde(default)]
    pub scopes_supported: Vec<String>,
}

impl ProtectedResourceMetadata {
    /// Build the document for `public_url`. A trailing `/` is ignored.
    #[must_use]
    pub fn for_public_url(public_url: &str, scope: &str) -> Self {
        let base = public_url.trim_end_matches('/');
        Self {
            resource: base.to_string(),
            authorization_servers: vec![base.to_string()],
            authorization_endpoint: format!("{base}/authorize"),
            token_endpoint: format!("{base}/token"),
            code_challenge_methods_supported: vec![ChallengeMethod::S256.as_str().to_string()],
            bearer_methods_supported: vec!["header".to_string()],
            scopes_supported: if scope.is_empty() {
                Vec::new()
            } else {
                vec![scope.to_string()]
            },
        }
    }
}
