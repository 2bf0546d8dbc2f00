//! OAuth2 authorization server core: code issuance, exchange, refresh and
//! bearer validation.
//!
//! Expected failures (unknown, expired or consumed grants, redirect or PKCE
//! mismatch) are `Ok(None)`; callers map them to `invalid_grant` /
//! `invalid_token`. Only storage faults surface as `Err`.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::debug;

use super::{
    audit::{self, AuditEvent},
    metadata::ProtectedResourceMetadata,
    models::{AccessToken, AuthorizationCode, Credentials, RefreshToken, TokenGrant, TokenLifetimes},
    pkce,
    store::{ExpiringStore, InMemoryStore},
    token,
};
use crate::{Error, Result};

/// Records removed by one sweep, per store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Expired authorization codes
    pub codes: usize,
    /// Expired access tokens
    pub access_tokens: usize,
    /// Expired refresh tokens
    pub refresh_tokens: usize,
}

impl SweepReport {
    /// Sum over all stores.
    #[must_use]
    pub fn total(&self) -> usize {
        self.codes + self.access_tokens + self.refresh_tokens
    }
}

/// The proxy's OAuth2 authorization server.
pub struct OAuth2Service {
    codes: Arc<dyn ExpiringStore<AuthorizationCode>>,
    access_tokens: Arc<dyn ExpiringStore<AccessToken>>,
    refresh_tokens: Arc<dyn ExpiringStore<RefreshToken>>,
    lifetimes: TokenLifetimes,
    scope: String,
}

impl OAuth2Service {
    /// Create a service over the given stores.
    pub fn new(
        codes: Arc<dyn ExpiringStore<AuthorizationCode>>,
        access_tokens: Arc<dyn ExpiringStore<AccessToken>>,
        refresh_tokens: Arc<dyn ExpiringStore<RefreshToken>>,
        lifetimes: TokenLifetimes,
    ) -> Self {
        Self {
            codes,
            access_tokens,
            refresh_tokens,
            lifetimes,
            scope: String::new(),
        }
    }

    /// Create a service backed by in-memory stores.
    #[must_use]
    pub fn in_memory(lifetimes: TokenLifetimes) -> Self {
        Self::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryStore::new()),
            lifetimes,
        )
    }

    /// Set the scope reported in token responses and metadata.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Configured lifetimes.
    #[must_use]
    pub fn lifetimes(&self) -> TokenLifetimes {
        self.lifetimes
    }

    /// Granted scope (may be empty).
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Mint and store a single-use authorization code bound to `credentials`.
    ///
    /// The caller has already checked the credentials against the backend and
    /// validated `redirect_uri` / `code_challenge`.
    pub async fn generate_authorization_code(
        &self,
        credentials: Credentials,
        redirect_uri: &str,
        code_challenge: &str,
    ) -> Result<String> {
        let code = token::generate();
        let issued_at = SystemTime::now();
        let ttl = self.lifetimes.code_ttl;
        let login = credentials.login.clone();

        let record = AuthorizationCode {
            credentials,
            redirect_uri: redirect_uri.to_string(),
            code_challenge: code_challenge.to_string(),
            issued_at,
            expires_at: expiry(issued_at, ttl)?,
        };
        self.codes.put(code.clone(), record, ttl).await?;

        audit::emit(&AuditEvent::code_issued(&login, &code));
        Ok(code)
    }

    /// Exchange an authorization code for an access/refresh pair.
    ///
    /// The code is consumed before any check runs, so a failed attempt burns it.
    pub async fn exchange_code_for_tokens(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<Option<TokenGrant>> {
        let Some(record) = self.codes.take_if_valid(code).await? else {
            debug!("Code exchange rejected: unknown, expired or consumed code");
            audit::emit(&AuditEvent::grant_rejected(code, "unknown_or_expired_code"));
            return Ok(None);
        };

        if record.redirect_uri != redirect_uri {
            debug!("Code exchange rejected: redirect_uri mismatch");
            audit::emit(&AuditEvent::grant_rejected(code, "redirect_uri_mismatch"));
            return Ok(None);
        }

        if !pkce::verify(code_verifier, &record.code_challenge) {
            debug!("Code exchange rejected: PKCE verification failed");
            audit::emit(&AuditEvent::grant_rejected(code, "pkce_mismatch"));
            return Ok(None);
        }

        let grant = self.mint_pair(record.credentials.clone(), 0).await?;
        audit::emit(&AuditEvent::token_issued(
            &record.credentials.login,
            &grant.access_token,
        ));
        Ok(Some(grant))
    }

    /// Rotate a refresh token into a new access/refresh pair.
    ///
    /// The presented token is consumed; there is no grace window for reuse.
    pub async fn refresh_tokens(&self, refresh_token: &str) -> Result<Option<TokenGrant>> {
        let Some(record) = self.refresh_tokens.take_if_valid(refresh_token).await? else {
            debug!("Refresh rejected: unknown, expired or consumed refresh token");
            audit::emit(&AuditEvent::grant_rejected(
                refresh_token,
                "unknown_or_expired_refresh_token",
            ));
            return Ok(None);
        };

        let rotation = record.rotation.saturating_add(1);
        let grant = self.mint_pair(record.credentials.clone(), rotation).await?;
        audit::emit(&AuditEvent::token_refreshed(
            &record.credentials.login,
            &grant.access_token,
            rotation,
        ));
        Ok(Some(grant))
    }

    /// Resolve a bearer token to its credentials without consuming it.
    pub async fn validate_access_token(&self, access_token: &str) -> Result<Option<Credentials>> {
        Ok(self
            .access_tokens
            .peek_if_valid(access_token)
            .await?
            .map(|t| t.credentials))
    }

    /// Build the protected-resource metadata document for `public_url`.
    #[must_use]
    pub fn generate_prm_document(&self, public_url: &str) -> ProtectedResourceMetadata {
        ProtectedResourceMetadata::for_public_url(public_url, &self.scope)
    }

    /// Remove expired records from all three stores.
    pub async fn sweep_expired(&self, now: SystemTime) -> Result<SweepReport> {
        Ok(SweepReport {
            codes: self.codes.sweep_expired(now).await?,
            access_tokens: self.access_tokens.sweep_expired(now).await?,
            refresh_tokens: self.refresh_tokens.sweep_expired(now).await?,
        })
    }

    async fn mint_pair(&self, credentials: Credentials, rotation: u32) -> Result<TokenGrant> {
        let access = token::generate();
        let refresh = token::generate();
        let issued_at = SystemTime::now();
        let TokenLifetimes {
            access_ttl,
            refresh_ttl,
            ..
        } = self.lifetimes;

        self.access_tokens
            .put(
                access.clone(),
                AccessToken {
                    credentials: credentials.clone(),
                    issued_at,
                    expires_at: expiry(issued_at, access_ttl)?,
                },
                access_ttl,
            )
            .await?;

        self.refresh_tokens
            .put(
                refresh.clone(),
                RefreshToken {
                    credentials,
                    access_token_ref: access.clone(),
                    rotation,
                    issued_at,
                    expires_at: expiry(issued_at, refresh_ttl)?,
                },
                refresh_ttl,
            )
            .await?;

        Ok(TokenGrant {
            access_token: access,
            token_type: "Bearer",
            expires_in: access_ttl.as_secs(),
            refresh_token: refresh,
        })
    }
}

fn expiry(issued_at: SystemTime, ttl: Duration) -> Result<SystemTime> {
    issued_at
        .checked_add(ttl)
        .ok_or_else(|| Error::Internal(format!("TTL out of range: {ttl:?}")))
}
