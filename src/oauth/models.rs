//! Records held by the OAuth2 stores.

use std::fmt;
use std::time::{Duration, SystemTime};

use serde::Serialize;

/// Backend identity (`login`, `password`) carried through the OAuth flow.
///
/// The password is opaque to the proxy: it is handed to the 1C backend as
/// HTTP Basic credentials and never logged. `Debug` redacts it.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// 1C user name
    pub login: String,
    /// 1C password
    pub password: String,
}

impl Credentials {
    /// Create a credential pair
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Single-use authorization code issued by `POST /authorize`.
#[derive(Debug, Clone)]
pub struct AuthorizationCode {
    /// Credentials the resource owner entered on the login form
    pub credentials: Credentials,
    /// Redirect URI; must match byte-for-byte on exchange
    pub redirect_uri: String,
    /// `base64url(SHA-256(code_verifier))`, unpadded
    pub code_challenge: String,
    /// Issue time
    pub issued_at: SystemTime,
    /// Expiry time
    pub expires_at: SystemTime,
}

/// Bearer access token bound to a backend identity.
#[derive(Debug, Clone)]
pub struct AccessToken {
    /// Bound identity
    pub credentials: Credentials,
    /// Issue time
    pub issued_at: SystemTime,
    /// Expiry time
    pub expires_at: SystemTime,
}

/// Refresh token. Consumed on every use and replaced (rotation).
#[derive(Debug, Clone)]
pub struct RefreshToken {
    /// Bound identity, copied forward on rotation
    pub credentials: Credentials,
    /// Access token minted together with this refresh token
    pub access_token_ref: String,
    /// Position in the rotation chain (0 = issued by code exchange)
    pub rotation: u32,
    /// Issue time
    pub issued_at: SystemTime,
    /// Expiry time
    pub expires_at: SystemTime,
}

/// Successful outcome of a code exchange or refresh.
#[derive(Debug, Clone, Serialize)]
pub struct TokenGrant {
    /// New access token
    pub access_token: String,
    /// Always `"Bearer"`
    pub token_type: &'static str,
    /// Access token lifetime in seconds
    pub expires_in: u64,
    /// New refresh token
    pub refresh_token: String,
}

/// Lifetimes of the three record kinds.
#[derive(Debug, Clone, Copy)]
pub struct TokenLifetimes {
    /// Authorization code TTL
    pub code_ttl: Duration,
    /// Access token TTL
    pub access_ttl: Duration,
    /// Refresh token TTL
    pub refresh_ttl: Duration,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            code_ttl: Duration::from_secs(120),
            access_ttl: Duration::from_secs(60 * 60),
            refresh_ttl: Duration::from_secs(14 * 24 * 60 * 60),
        }
    }
}

/// Shorten a secret for log output.
pub(crate) fn token_prefix(token: &str) -> &str {
    token.get(..8).unwrap_or(token)
}
