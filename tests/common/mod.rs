//! Shared harness: a mock 1C HTTP service and a proxy bound to an ephemeral port

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    http::{HeaderMap, StatusCode, header},
    routing::{get, post},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use onec_mcp_proxy::config::{AuthMode, Config};
use onec_mcp_proxy::gateway::Gateway;
use onec_mcp_proxy::oauth::{OAuth2Service, pkce};

/// Accounts known to the mock backend.
pub const USERS: &[(&str, &str)] = &[("ivanov", "secret"), ("petrov", "qwerty")];

pub const REDIRECT_URI: &str = "http://localhost:5173/callback";

fn basic_login(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = String::from_utf8(STANDARD.decode(encoded).ok()?).ok()?;
    let (login, password) = decoded.split_once(':')?;
    USERS
        .iter()
        .any(|(l, p)| *l == login && *p == password)
        .then(|| login.to_string())
}

/// Start a mock 1C infobase at `http://{addr}/base` serving `hs/mcp/health`
/// and `hs/mcp/rpc`. The RPC reply echoes the authenticated login.
pub async fn spawn_backend() -> SocketAddr {
    let app = Router::new()
        .route(
            "/base/hs/mcp/health",
            get(|headers: HeaderMap| async move {
                match basic_login(&headers) {
                    Some(_) => (StatusCode::OK, Json(json!({"status": "ok"}))),
                    None => (StatusCode::UNAUTHORIZED, Json(json!({"error": "unauthorized"}))),
                }
            }),
        )
        .route(
            "/base/hs/mcp/rpc",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                match basic_login(&headers) {
                    Some(login) => (
                        StatusCode::OK,
                        Json(json!({
                            "jsonrpc": "2.0",
                            "id": body["id"],
                            "result": {"login": login, "method": body["method"]}
                        })),
                    ),
                    None => (StatusCode::UNAUTHORIZED, Json(json!({}))),
                }
            }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    addr
}

/// Configuration pointing at the mock backend.
pub fn config(backend: SocketAddr, mode: AuthMode) -> Config {
    let mut config = Config::default();
    config.backend.url = format!("http://{backend}/base");
    config.auth.mode = mode;
    if mode == AuthMode::Static {
        config.backend.username = Some("ivanov".into());
        config.backend.password = Some("secret".into());
    }
    config
}

/// A running proxy.
pub struct TestProxy {
    pub base: String,
    pub http: reqwest::Client,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<onec_mcp_proxy::Result<()>>,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// Trigger graceful shutdown and wait for `serve` to return.
    pub async fn stop(mut self) -> onec_mcp_proxy::Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.await.unwrap()
    }
}

pub async fn spawn_proxy(config: Config) -> TestProxy {
    spawn_proxy_with(config, None).await
}

/// Start a proxy, optionally around a caller-supplied authorization server.
pub async fn spawn_proxy_with(mut config: Config, service: Option<Arc<OAuth2Service>>) -> TestProxy {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    config.server.public_url = Some(format!("http://{addr}"));

    let gateway = match service {
        Some(svc) => Gateway::with_oauth_service(config, svc).unwrap(),
        None => Gateway::new(config).unwrap(),
    };

    let (tx, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(gateway.serve(listener, async move {
        let _ = rx.await;
    }));

    let http = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    TestProxy {
        base: format!("http://{addr}"),
        http,
        shutdown: Some(tx),
        handle,
    }
}

/// Submit the login form and return the `code` from the redirect.
pub async fn authorize(proxy: &TestProxy, login: &str, password: &str, challenge: &str) -> String {
    authorize_with(proxy, login, password, challenge, REDIRECT_URI).await
}

pub async fn authorize_with(
    proxy: &TestProxy,
    login: &str,
    password: &str,
    challenge: &str,
    redirect_uri: &str,
) -> String {
    let resp = proxy
        .http
        .post(proxy.url("/authorize"))
        .form(&[
            ("response_type", "code"),
            ("client_id", "test-client"),
            ("redirect_uri", redirect_uri),
            ("state", "st-1"),
            ("code_challenge", challenge),
            ("code_challenge_method", "S256"),
            ("username", login),
            ("password", password),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::FOUND);

    let location = resp.headers()[reqwest::header::LOCATION].to_str().unwrap().to_string();
    let query = location.split_once('?').unwrap().1;
    let params: HashMap<String, String> = serde_urlencoded::from_str(query).unwrap();
    assert_eq!(params["state"], "st-1");
    params["code"].clone()
}

/// Run the whole authorization flow for `login` and return the token response.
pub async fn login(proxy: &TestProxy, login: &str, password: &str) -> Value {
    let (verifier, challenge) = pkce::generate_pair();
    let code = authorize(proxy, login, password, &challenge).await;
    let resp = token_request(
        proxy,
        &[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", REDIRECT_URI),
            ("code_verifier", &verifier),
        ],
    )
    .await;
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    resp.json().await.unwrap()
}

pub async fn token_request(proxy: &TestProxy, form: &[(&str, &str)]) -> reqwest::Response {
    proxy
        .http
        .post(proxy.url("/token"))
        .form(form)
        .send()
        .await
        .unwrap()
}

/// `POST /mcp` with an optional bearer token.
pub async fn call_mcp(proxy: &TestProxy, token: Option<&str>, body: &Value) -> reqwest::Response {
    let mut req = proxy.http.post(proxy.url("/mcp")).json(body);
    if let Some(t) = token {
        req = req.bearer_auth(t);
    }
    req.send().await.unwrap()
}
