//! Audit logging for OAuth2 code and token lifecycle events.
//!
//! Every event is emitted via `tracing::info!` as a JSON blob in the `audit`
//! field. Secrets never appear: codes and tokens are reduced to an 8-character
//! prefix and passwords are not carried at all.
//!
//! # Events
//!
//! | Event | When |
//! |-------|------|
//! | `code.issued` | `POST /authorize` accepted credentials and minted a code |
//! | `token.issued` | A code was exchanged for an access/refresh pair |
//! | `token.refreshed` | A refresh token was rotated |
//! | `grant.rejected` | A code exchange or refresh failed |
//! | `token.rejected` | A bearer token was refused at the gate |

use serde::Serialize;

use super::models::token_prefix;

/// Structured audit event.
#[derive(Debug, Serialize)]
pub struct AuditEvent {
    /// Event type string (e.g., `"token.issued"`).
    pub event: &'static str,
    /// Backend login the event concerns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    /// Prefix of the affected code or token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_prefix: Option<String>,
    /// Refresh chain position.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<u32>,
    /// Why a grant or token was refused.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

impl AuditEvent {
    fn new(event: &'static str) -> Self {
        Self {
            event,
            login: None,
            token_prefix: None,
            rotation: None,
            reason: None,
        }
    }

    /// `code.issued`
    #[must_use]
    pub fn code_issued(login: &str, code: &str) -> Self {
        Self {
            login: Some(login.to_string()),
            token_prefix: Some(token_prefix(code).to_string()),
            ..Self::new("code.issued")
        }
    }

    /// `token.issued`
    #[must_use]
    pub fn token_issued(login: &str, access_token: &str) -> Self {
        Self {
            login: Some(login.to_string()),
            token_prefix: Some(token_prefix(access_token).to_string()),
            rotation: Some(0),
            ..Self::new("token.issued")
        }
    }

    /// `token.refreshed`
    #[must_use]
    pub fn token_refreshed(login: &str, access_token: &str, rotation: u32) -> Self {
        Self {
            login: Some(login.to_string()),
            token_prefix: Some(token_prefix(access_token).to_string()),
            rotation: Some(rotation),
            ..Self::new("token.refreshed")
        }
    }

    /// `grant.rejected`
    #[must_use]
    pub fn grant_rejected(grant: &str, reason: &'static str) -> Self {
        Self {
            token_prefix: Some(token_prefix(grant).to_string()),
            reason: Some(reason),
            ..Self::new("grant.rejected")
        }
    }

    /// `token.rejected`
    #[must_use]
    pub fn token_rejected(reason: &'static str) -> Self {
        Self {
            reason: Some(reason),
            ..Self::new("token.rejected")
        }
    }
}

/// Emit an audit event.
pub fn emit(event: &AuditEvent) {
    match serde_json::to_string(event) {
        Ok(ref json) => tracing::info!(audit = %json, "oauth audit"),
        Err(ref e) => tracing::warn!(error = %e, "Failed to serialize audit event"),
    }
}
