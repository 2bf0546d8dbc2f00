//! 1C MCP Proxy Library
//!
//! MCP proxy for 1C:Enterprise HTTP services. Remote MCP clients authorize
//! with OAuth2 (Authorization Code + PKCE) using their 1C login; each
//! forwarded JSON-RPC request then carries that user's credentials to the
//! backend.
//!
//! # Features
//!
//! - **OAuth2 authorization server**: single-use codes, refresh rotation,
//!   RFC 9728 protected-resource metadata
//! - **Per-request credentials**: bound to the request, never shared state
//! - **Static mode**: one configured 1C account for trusted deployments
//! - **Stdio transport**: line-delimited JSON-RPC for local MCP clients
//! - **Production Ready**: structured logging, audit events, graceful shutdown

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod oauth;
pub mod stdio;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// Logs go to stderr so stdout stays free for the stdio transport.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {e}")))?,
        _ => subscriber
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {e}")))?,
    }

    Ok(())
}
