//! Configuration management

use std::{env, fmt, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::oauth::{Credentials, DEFAULT_CLEANUP_INTERVAL, TokenLifetimes};
use crate::{Error, Result};

/// Prefix for environment overrides (`MCP_SERVER__PORT=9000`).
pub const ENV_PREFIX: &str = "MCP_";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before environment overrides are applied.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    pub env_files: Vec<String>,
    /// HTTP server configuration
    pub server: ServerConfig,
    /// 1C backend configuration
    pub backend: BackendConfig,
    /// Authorization configuration
    pub auth: AuthConfig,
}

impl Config {
    /// Load configuration: defaults, then the YAML file, then `MCP_*`
    /// environment variables.
    ///
    /// `env_files` named in the YAML file are loaded into the process
    /// environment before the environment layer is read, so they can carry
    /// `MCP_*` overrides as well as `${VAR}` values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        let env_files: Vec<String> = figment.extract_inner("env_files").unwrap_or_default();
        load_env_files(&env_files);

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.expand_env_vars()?;
        Ok(config)
    }

    /// Reject configurations the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.backend.url.trim().is_empty() {
            return Err(Error::Config(
                "backend.url is required (MCP_ONEC_URL or --onec-url)".to_string(),
            ));
        }
        url::Url::parse(&self.backend.url)
            .map_err(|e| Error::Config(format!("Invalid backend.url {:?}: {e}", self.backend.url)))?;

        if self.auth.mode == AuthMode::Static && self.backend.static_credentials().is_none() {
            return Err(Error::Config(
                "auth.mode = static requires backend.username".to_string(),
            ));
        }
        if self.auth.cleanup_interval.is_zero() {
            return Err(Error::Config(
                "auth.cleanup_interval must be greater than zero".to_string(),
            ));
        }
        if self.auth.protected_paths.iter().any(|p| !p.starts_with('/')) {
            return Err(Error::Config(
                "auth.protected_paths entries must start with '/'".to_string(),
            ));
        }
        if let Some(ref public) = self.server.public_url {
            url::Url::parse(public)
                .map_err(|e| Error::Config(format!("Invalid server.public_url {public:?}: {e}")))?;
        }
        Ok(())
    }

    /// Expand `${VAR}` and `${VAR:-default}` in backend settings.
    fn expand_env_vars(&mut self) -> Result<()> {
        let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .map_err(|e| Error::Internal(e.to_string()))?;

        self.backend.url = expand_string(&re, &self.backend.url);
        for value in [&mut self.backend.username, &mut self.backend.password]
            .into_iter()
            .flatten()
        {
            *value = expand_string(&re, value);
        }
        if let Some(ref mut public) = self.server.public_url {
            *public = expand_string(&re, public);
        }
        Ok(())
    }
}

/// Load one env file into the process environment (`--env-file`).
pub fn load_env_file(path: &Path) -> Result<()> {
    dotenvy::from_path(path).map_err(|e| {
        Error::Config(format!("Failed to load env file {}: {e}", path.display()))
    })?;
    tracing::info!("Loaded env file: {}", path.display());
    Ok(())
}

/// Load environment files. Supports ~ expansion. Missing files are skipped.
fn load_env_files(paths: &[String]) {
    for path_str in paths {
        let expanded = match (path_str.strip_prefix('~'), dirs::home_dir()) {
            (Some(rest), Some(home)) => format!("{}{rest}", home.display()),
            _ => path_str.clone(),
        };

        let path = Path::new(&expanded);
        if path.exists() {
            if let Err(e) = dotenvy::from_path(path) {
                tracing::warn!("Failed to load env file {expanded}: {e}");
            } else {
                tracing::info!("Loaded env file: {expanded}");
            }
        } else {
            tracing::debug!("Env file not found (skipped): {expanded}");
        }
    }
}

fn expand_string(re: &Regex, value: &str) -> String {
    re.replace_all(value, |caps: &regex::Captures| {
        let var_name = &caps[1];
        let default = caps.get(2).map_or("", |m| m.as_str());
        env::var(var_name).unwrap_or_else(|_| default.to_string())
    })
    .into_owned()
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Externally visible base URL (defaults to `http://host:port`)
    pub public_url: Option<String>,
    /// Request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Graceful shutdown timeout
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    /// Maximum request body size (bytes)
    pub max_body_size: usize,
    /// Allowed CORS origins (`*` for any)
    pub cors_origins: Vec<String>,
    /// Service name reported by `/` and `/health`
    pub name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            public_url: None,
            request_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(30),
            max_body_size: 10 * 1024 * 1024, // 10MB
            cors_origins: vec!["*".to_string()],
            name: "1C-MCP-Proxy".to_string(),
        }
    }
}

impl ServerConfig {
    /// Public base URL without a trailing slash.
    #[must_use]
    pub fn public_url(&self) -> String {
        self.public_url.as_deref().map_or_else(
            || format!("http://{}:{}", self.host, self.port),
            |u| u.trim_end_matches('/').to_string(),
        )
    }
}

/// 1C backend configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the 1C infobase (e.g. `http://localhost/base`)
    pub url: String,
    /// HTTP service root (`/hs/<service_root>/...`)
    pub service_root: String,
    /// User name for static mode
    pub username: Option<String>,
    /// Password for static mode
    pub password: Option<String>,
    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            service_root: "mcp".to_string(),
            username: None,
            password: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("url", &self.url)
            .field("service_root", &self.service_root)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl BackendConfig {
    /// Credentials used in static mode, if a username is configured.
    #[must_use]
    pub fn static_credentials(&self) -> Option<Credentials> {
        self.username
            .as_deref()
            .filter(|u| !u.is_empty())
            .map(|u| Credentials::new(u, self.password.clone().unwrap_or_default()))
    }
}

/// How protected paths resolve backend credentials
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Every request uses the configured backend username/password
    #[default]
    Static,
    /// Requests carry an OAuth2 bearer token bound to per-user credentials
    #[serde(alias = "oauth")]
    OAuth2,
}

impl AuthMode {
    /// Configuration name of the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::OAuth2 => "oauth2",
        }
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AuthMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "static" => Ok(Self::Static),
            "oauth2" | "oauth" => Ok(Self::OAuth2),
            other => Err(Error::Config(format!(
                "Unknown auth mode {other:?} (expected static or oauth2)"
            ))),
        }
    }
}

/// Authorization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Credential resolution mode
    pub mode: AuthMode,
    /// Path prefixes guarded by the bearer gate
    pub protected_paths: Vec<String>,
    /// Authorization code lifetime
    #[serde(with = "humantime_serde")]
    pub code_ttl: Duration,
    /// Access token lifetime
    #[serde(with = "humantime_serde")]
    pub access_ttl: Duration,
    /// Refresh token lifetime
    #[serde(with = "humantime_serde")]
    pub refresh_ttl: Duration,
    /// Interval between sweeps of expired records
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
    /// Scope granted to every token
    pub scope: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        let lifetimes = TokenLifetimes::default();
        Self {
            mode: AuthMode::default(),
            protected_paths: vec!["/mcp".to_string()],
            code_ttl: lifetimes.code_ttl,
            access_ttl: lifetimes.access_ttl,
            refresh_ttl: lifetimes.refresh_ttl,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            scope: "mcp".to_string(),
        }
    }
}

impl AuthConfig {
    /// Token lifetimes for the OAuth2 service.
    #[must_use]
    pub fn lifetimes(&self) -> TokenLifetimes {
        TokenLifetimes {
            code_ttl: self.code_ttl,
            access_ttl: self.access_ttl,
            refresh_ttl: self.refresh_ttl,
        }
    }
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to human-readable string (e.g., "30s", "250ms")
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Deserialize human-readable duration string
    /// (`"100ms"`, `"30s"`, `"5m"`, `"1h"`, `"14d"`, or bare seconds).
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Secs(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Secs(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(s) => parse(s.trim()).map_err(serde::de::Error::custom),
        }
    }

    /// Parse a duration string.
    pub fn parse(s: &str) -> Result<Duration, String> {
        let num = |n: &str| {
            n.trim()
                .parse::<u64>()
                .map_err(|e| format!("invalid duration {s:?}: {e}"))
        };

        let scaled = |n: &str, factor: u64| {
            num(n)?
                .checked_mul(factor)
                .map(Duration::from_secs)
                .ok_or_else(|| format!("duration {s:?} is out of range"))
        };

        // "ms" must be tried before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            num(ms).map(Duration::from_millis)
        } else if let Some(secs) = s.strip_suffix('s') {
            num(secs).map(Duration::from_secs)
        } else if let Some(mins) = s.strip_suffix('m') {
            scaled(mins, 60)
        } else if let Some(hours) = s.strip_suffix('h') {
            scaled(hours, 60 * 60)
        } else if let Some(days) = s.strip_suffix('d') {
            scaled(days, 24 * 60 * 60)
        } else {
            num(s).map(Duration::from_secs)
        }
    }
}
