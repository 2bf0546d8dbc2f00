//! OAuth 2.0 authorization server for MCP clients
//!
//! Implements the Authorization Code flow with PKCE (RFC 7636) where this
//! proxy is both the authorization server and the protected resource.
//! Tokens are opaque and bound to the backend credentials the user entered
//! on the login form.
//!
//! Features:
//! - Single-use authorization codes and refresh tokens
//! - Refresh token rotation
//! - Protected Resource Metadata discovery (RFC 9728)
//! - Background sweeping of expired records

pub mod audit;
mod cleanup;
mod error;
mod metadata;
mod models;
pub mod pkce;
mod service;
pub mod store;
pub mod token;

pub use cleanup::{CleanupScheduler, DEFAULT_CLEANUP_INTERVAL};
pub use error::{INVALID_GRANT_DESCRIPTION, OAuthError};
pub use metadata::ProtectedResourceMetadata;
pub use models::{AccessToken, AuthorizationCode, Credentials, RefreshToken, TokenGrant, TokenLifetimes};
pub use service::{OAuth2Service, SweepReport};
pub use store::{ExpiringStore, InMemoryStore};
