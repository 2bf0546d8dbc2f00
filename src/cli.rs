//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{AuthMode, Config};

/// MCP proxy for 1C:Enterprise HTTP services
#[derive(Parser, Debug)]
#[command(name = "onec-mcp-proxy")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "MCP_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Env file to load before reading configuration
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,

    /// Host to bind to
    #[arg(long, env = "MCP_HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "MCP_PORT")]
    pub port: Option<u16>,

    /// Externally visible base URL (used in OAuth2 metadata and redirects)
    #[arg(long, env = "MCP_PUBLIC_URL")]
    pub public_url: Option<String>,

    /// Base URL of the 1C infobase
    #[arg(long, env = "MCP_ONEC_URL")]
    pub onec_url: Option<String>,

    /// 1C user name (static mode)
    #[arg(long, env = "MCP_ONEC_USERNAME")]
    pub onec_username: Option<String>,

    /// 1C password (static mode)
    #[arg(long, env = "MCP_ONEC_PASSWORD", hide_env_values = true)]
    pub onec_password: Option<String>,

    /// Root of the 1C HTTP service (`/hs/<root>`)
    #[arg(long, env = "MCP_ONEC_SERVICE_ROOT")]
    pub onec_service_root: Option<String>,

    /// Authorization mode (static, oauth2)
    #[arg(long, env = "MCP_AUTH_MODE")]
    pub auth_mode: Option<AuthMode>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "MCP_LOG_LEVEL", global = true)]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "MCP_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the proxy server (default)
    Serve,

    /// Relay JSON-RPC over stdin/stdout using the configured 1C account
    Stdio,

    /// Print a PKCE verifier/challenge pair for testing the OAuth2 flow by hand
    Pkce {
        /// Verifier to hash (a random one is generated when omitted)
        verifier: Option<String>,
    },
}

impl Cli {
    /// Apply command-line overrides on top of loaded configuration.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(ref host) = self.host {
            config.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(ref public_url) = self.public_url {
            config.server.public_url = Some(public_url.clone());
        }
        if let Some(ref url) = self.onec_url {
            config.backend.url.clone_from(url);
        }
        if let Some(ref username) = self.onec_username {
            config.backend.username = Some(username.clone());
        }
        if let Some(ref password) = self.onec_password {
            config.backend.password = Some(password.clone());
        }
        if let Some(ref root) = self.onec_service_root {
            config.backend.service_root.clone_from(root);
        }
        if let Some(mode) = self.auth_mode {
            config.auth.mode = mode;
        }
    }
}
