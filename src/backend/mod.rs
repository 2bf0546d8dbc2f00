//! 1C:Enterprise HTTP service client
//!
//! The backend exposes two endpoints under `{url}/hs/{service_root}`:
//! `GET /health` answering `{"status":"ok"}` and `POST /rpc` accepting
//! JSON-RPC 2.0 envelopes. Every call authenticates with HTTP Basic using the
//! credentials bound to the current request; the client itself holds none.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::BackendConfig;
use crate::oauth::Credentials;
use crate::{Error, Result};

/// HTTP client for one 1C HTTP service.
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    service_base_url: String,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    #[serde(default)]
    status: String,
}

impl BackendClient {
    /// Build a client from configuration.
    pub fn new(config: &BackendConfig) -> Result<Self> {
        Self::from_parts(&config.url, &config.service_root, config.timeout)
    }

    /// Build a client for `{base_url}/hs/{service_root}`.
    pub fn from_parts(base_url: &str, service_root: &str, timeout: Duration) -> Result<Self> {
        if base_url.trim().is_empty() {
            return Err(Error::Config("Backend URL must not be empty".to_string()));
        }

        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()?;

        let service_base_url = format!(
            "{}/hs/{}",
            base_url.trim_end_matches('/'),
            service_root.trim_matches('/')
        );
        debug!(url = %service_base_url, "Backend service URL");

        Ok(Self {
            client,
            service_base_url,
        })
    }

    /// Base URL of the HTTP service (`{url}/hs/{root}`).
    #[must_use]
    pub fn service_url(&self) -> &str {
        &self.service_base_url
    }

    /// Check `credentials` against the health endpoint.
    ///
    /// Returns `Ok(())` when the backend accepts them,
    /// [`Error::BackendRejected`] on 401/403 and
    /// [`Error::BackendUnavailable`] when it cannot be reached, answers with
    /// a server error or reports itself unhealthy.
    pub async fn check_credentials(&self, credentials: &Credentials) -> Result<()> {
        self.health_check(Some(credentials)).await?;
        debug!(login = %credentials.login, "Backend accepted credentials");
        Ok(())
    }

    /// Call the health endpoint, authenticated when `credentials` are given.
    ///
    /// Without credentials a 401/403 still proves the service is up, so it
    /// counts as reachable.
    pub async fn health_check(&self, credentials: Option<&Credentials>) -> Result<()> {
        let url = format!("{}/health", self.service_base_url);
        let mut request = self.client.get(&url);
        if let Some(c) = credentials {
            request = request.basic_auth(&c.login, Some(&c.password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::BackendUnavailable(format!("Health check failed: {e}")))?;

        let status = response.status();
        if credentials.is_none()
            && matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
        {
            return Ok(());
        }
        check_status(status)?;

        let health: HealthResponse = response
            .json()
            .await
            .map_err(|e| Error::BackendUnavailable(format!("Invalid health response: {e}")))?;

        if health.status == "ok" {
            Ok(())
        } else {
            warn!(status = %health.status, "Backend reported unhealthy");
            Err(Error::BackendUnavailable(format!(
                "Backend reported status {:?}",
                health.status
            )))
        }
    }

    /// Forward a JSON-RPC envelope to `/rpc` and return the backend's reply.
    pub async fn forward(&self, credentials: &Credentials, envelope: &Value) -> Result<Value> {
        let url = format!("{}/rpc", self.service_base_url);
        let method = envelope.get("method").and_then(Value::as_str).unwrap_or("-");
        debug!(login = %credentials.login, method, "Forwarding JSON-RPC request");

        let response = self
            .client
            .post(&url)
            .basic_auth(&credentials.login, Some(&credentials.password))
            .json(envelope)
            .send()
            .await
            .map_err(|e| Error::BackendUnavailable(format!("Request failed: {e}")))?;

        check_status(response.status())?;

        response
            .json()
            .await
            .map_err(|e| Error::Backend(format!("Failed to parse response: {e}")))
    }
}

fn check_status(status: StatusCode) -> Result<()> {
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(Error::BackendRejected(status.as_u16()))
        }
        s if s.is_server_error() => Err(Error::BackendUnavailable(format!("HTTP {s}"))),
        s => Err(Error::Backend(format!("Unexpected HTTP {s}"))),
    }
}
