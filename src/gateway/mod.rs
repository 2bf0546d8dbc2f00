//! Proxy server implementation

pub mod auth;
pub mod credentials;
mod oauth_routes;
mod router;
mod server;

pub use auth::{AuthGate, bearer_auth_middleware};
pub use credentials::{CredentialContext, CredentialSource};
pub use oauth_routes::{OAuthRoutes, oauth_router};
pub use router::{AppState, create_router};
pub use server::Gateway;
