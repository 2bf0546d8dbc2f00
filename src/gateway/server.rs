//! Proxy server

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use super::auth::AuthGate;
use super::oauth_routes::OAuthRoutes;
use super::router::{AppState, create_router};
use crate::backend::BackendClient;
use crate::config::{AuthMode, Config};
use crate::oauth::{CleanupScheduler, OAuth2Service};
use crate::{Error, Result};

/// MCP proxy server
pub struct Gateway {
    /// Configuration
    config: Config,
    /// Authorization server (oauth2 mode only)
    oauth: Option<Arc<OAuth2Service>>,
}

impl Gateway {
    /// Create a proxy from validated configuration. In oauth2 mode the
    /// tokens live in memory.
    pub fn new(config: Config) -> Result<Self> {
        let oauth = (config.auth.mode == AuthMode::OAuth2).then(|| {
            Arc::new(
                OAuth2Service::in_memory(config.auth.lifetimes()).with_scope(&config.auth.scope),
            )
        });
        Self::build(config, oauth)
    }

    /// Create a proxy in oauth2 mode around an existing authorization server.
    pub fn with_oauth_service(mut config: Config, service: Arc<OAuth2Service>) -> Result<Self> {
        config.auth.mode = AuthMode::OAuth2;
        Self::build(config, Some(service))
    }

    fn build(config: Config, oauth: Option<Arc<OAuth2Service>>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, oauth })
    }

    /// The authorization server, when running in oauth2 mode.
    #[must_use]
    pub fn oauth_service(&self) -> Option<&Arc<OAuth2Service>> {
        self.oauth.as_ref()
    }

    /// Build the HTTP application.
    pub fn router(&self) -> Result<Router> {
        let backend = BackendClient::new(&self.config.backend)?;
        let public_url = self.config.server.public_url();
        let protected = self.config.auth.protected_paths.clone();

        let (auth_gate, oauth_routes) = match self.oauth {
            Some(ref service) => (
                AuthGate::oauth2(Arc::clone(service), protected, &public_url),
                Some(Arc::new(OAuthRoutes::new(
                    Arc::clone(service),
                    backend.clone(),
                    &public_url,
                    &self.config.server.name,
                ))),
            ),
            None => {
                let credentials = self.config.backend.static_credentials().ok_or_else(|| {
                    Error::Config("auth.mode = static requires backend.username".to_string())
                })?;
                (AuthGate::static_mode(credentials, protected), None)
            }
        };

        let state = Arc::new(AppState {
            backend,
            auth_gate: Arc::new(auth_gate),
            oauth_routes,
            service_name: self.config.server.name.clone(),
            health_credentials: self.config.backend.static_credentials(),
        });
        Ok(create_router(state, &self.config.server))
    }

    /// Run the proxy until Ctrl+C / SIGTERM
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        // Bind listener
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on `listener` until `shutdown` resolves.
    ///
    /// The cleanup scheduler starts once the listener is bound and stops after
    /// in-flight requests have drained.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let app = self.router()?;
        self.log_banner(&listener);

        let scheduler = self.oauth.as_ref().map(|service| {
            CleanupScheduler::new(Arc::clone(service), self.config.auth.cleanup_interval)
        });
        if let Some(ref s) = scheduler {
            s.start();
        }

        // Run server with graceful shutdown
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| Error::Internal(e.to_string()));

        if let Some(s) = scheduler {
            if tokio::time::timeout(self.config.server.shutdown_timeout, s.stop())
                .await
                .is_err()
            {
                warn!("Cleanup scheduler did not stop within the shutdown timeout");
            }
        }

        served
    }

    fn log_banner(&self, listener: &TcpListener) {
        let server = &self.config.server;
        let local = listener
            .local_addr()
            .map_or_else(|_| format!("{}:{}", server.host, server.port), |a| a.to_string());

        info!("============================================================");
        info!("{} v{}", server.name, env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(address = %local, "Listening");
        info!(
            url = %self.config.backend.url,
            service_root = %self.config.backend.service_root,
            "1C HTTP service"
        );
        info!("  POST {}/mcp  (JSON-RPC)", server.public_url());

        match self.config.auth.mode {
            AuthMode::OAuth2 => {
                info!(
                    protected = ?self.config.auth.protected_paths,
                    "AUTHORIZATION: OAuth2 (PKCE S256), per-user 1C credentials"
                );
                info!("  GET  {}/authorize", server.public_url());
                info!("  POST {}/token", server.public_url());
            }
            AuthMode::Static => {
                warn!(
                    login = self.config.backend.username.as_deref().unwrap_or("-"),
                    "AUTHORIZATION: static - every request uses the configured 1C account"
                );
            }
        }
        info!("============================================================");
    }
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
