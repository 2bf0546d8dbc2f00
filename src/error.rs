//! Error types for the 1C MCP proxy

use std::io;

use serde_json::{Value, json};
use thiserror::Error;

/// Result type alias for the proxy
pub type Result<T> = std::result::Result<T, Error>;

/// Proxy errors
///
/// Expected authorization failures are not errors at this level; they are
/// `Ok(None)` results from the OAuth service and [`crate::oauth::OAuthError`]
/// at the HTTP edge. Everything here is an infrastructure fault.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Token/code storage fault (never conflated with an invalid grant)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Backend could not be reached or answered with a server error
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Backend refused the supplied credentials
    #[error("Backend rejected credentials (HTTP {0})")]
    BackendRejected(u16),

    /// Backend answered, but not with something we understand
    #[error("Backend error: {0}")]
    Backend(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convert to a JSON-RPC error code for the dispatch endpoint
    #[must_use]
    pub fn to_rpc_code(&self) -> i32 {
        match self {
            Self::Json(_) => rpc_codes::PARSE_ERROR,
            Self::BackendUnavailable(_) | Self::Http(_) => rpc_codes::BACKEND_UNAVAILABLE,
            Self::BackendRejected(_) => rpc_codes::BACKEND_REJECTED,
            Self::Backend(_) => rpc_codes::BACKEND_ERROR,
            _ => rpc_codes::INTERNAL_ERROR,
        }
    }
}

/// JSON-RPC 2.0 error response body.
#[must_use]
pub fn rpc_error_body(code: i32, message: &str, id: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": {
            "code": code,
            "message": message
        },
        "id": id
    })
}

/// JSON-RPC error codes used when relaying backend failures
pub mod rpc_codes {
    /// Parse error - Invalid JSON
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid Request - Not a valid Request object
    pub const INVALID_REQUEST: i32 = -32600;
    /// Internal error
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Backend could not be reached
    pub const BACKEND_UNAVAILABLE: i32 = -32000;
    /// Backend refused the request credentials
    pub const BACKEND_REJECTED: i32 = -32001;
    /// Backend returned an unusable response
    pub const BACKEND_ERROR: i32 = -32002;
}
