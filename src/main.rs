//! 1C MCP Proxy - MCP proxy for 1C:Enterprise HTTP services
//!
//! OAuth2 (PKCE) authorization with per-request 1C credentials.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use onec_mcp_proxy::{
    cli::{Cli, Command},
    config::{self, Config},
    gateway::Gateway,
    oauth::pkce,
    setup_tracing, stdio,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    // Handle subcommands
    match cli.command {
        Some(Command::Pkce { ref verifier }) => run_pkce(verifier.as_deref()),
        Some(Command::Stdio) => run_stdio(&cli).await,
        Some(Command::Serve) | None => run_server(&cli).await,
    }
}

/// Print a verifier/challenge pair
fn run_pkce(verifier: Option<&str>) -> ExitCode {
    let (verifier, challenge) = match verifier {
        Some(v) if v.is_empty() => {
            eprintln!("Verifier must not be empty");
            return ExitCode::FAILURE;
        }
        Some(v) => (v.to_string(), pkce::challenge_for(v)),
        None => pkce::generate_pair(),
    };

    println!("code_verifier:         {verifier}");
    println!("code_challenge:        {challenge}");
    println!("code_challenge_method: {}", pkce::ChallengeMethod::S256);
    ExitCode::SUCCESS
}

/// Load configuration: env file, YAML/env layers, then CLI overrides
fn load_config(cli: &Cli) -> Option<Config> {
    if let Some(ref path) = cli.env_file {
        if let Err(e) = config::load_env_file(path) {
            error!("{e}");
            return None;
        }
    }

    match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            // Apply CLI overrides
            cli.apply_overrides(&mut config);
            Some(config)
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            None
        }
    }
}

/// Run the stdio relay
async fn run_stdio(cli: &Cli) -> ExitCode {
    let Some(config) = load_config(cli) else {
        return ExitCode::FAILURE;
    };

    if let Err(e) = stdio::run(&config).await {
        error!("Stdio relay error: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

/// Run the proxy server
async fn run_server(cli: &Cli) -> ExitCode {
    let Some(config) = load_config(cli) else {
        return ExitCode::FAILURE;
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        auth_mode = %config.auth.mode,
        "Starting 1C MCP proxy"
    );

    let gateway = match Gateway::new(config) {
        Ok(g) => g,
        Err(e) => {
            error!("Failed to create proxy: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Run with graceful shutdown
    if let Err(e) = gateway.run().await {
        error!("Proxy error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Proxy shutdown complete");
    ExitCode::SUCCESS
}
