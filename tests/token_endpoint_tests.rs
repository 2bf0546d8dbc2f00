//! Token endpoint error handling
//!
//! Covers the error codes of `POST /token`, response headers, and the split
//! between refused grants (4xx) and storage faults (500).

mod common;

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use common::{REDIRECT_URI, spawn_backend, spawn_proxy, spawn_proxy_with, token_request};
use onec_mcp_proxy::config::AuthMode;
use onec_mcp_proxy::oauth::{ExpiringStore, OAuth2Service, TokenLifetimes, pkce};
use onec_mcp_proxy::{Error, Result};
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::Value;

async fn error_of(resp: reqwest::Response) -> (StatusCode, String) {
    let status = resp.status();
    let body: Value = resp.json().await.unwrap();
    (status, body["error"].as_str().unwrap_or_default().to_string())
}

#[tokio::test]
async fn test_unknown_grant_type() {
    let backend = spawn_backend().await;
    let proxy = spawn_proxy(common::config(backend, AuthMode::OAuth2)).await;

    let resp = token_request(&proxy, &[("grant_type", "password")]).await;
    assert_eq!(
        error_of(resp).await,
        (StatusCode::BAD_REQUEST, "unsupported_grant_type".to_string())
    );

    proxy.stop().await.unwrap();
}

#[tokio::test]
async fn test_missing_parameters_are_invalid_request() {
    let backend = spawn_backend().await;
    let proxy = spawn_proxy(common::config(backend, AuthMode::OAuth2)).await;

    let cases: [&[(&str, &str)]; 4] = [
        &[],
        &[("grant_type", "authorization_code")],
        &[
            ("grant_type", "authorization_code"),
            ("code", "abc"),
            ("redirect_uri", REDIRECT_URI),
        ],
        &[("grant_type", "refresh_token")],
    ];
    for form in cases {
        let resp = token_request(&proxy, form).await;
        assert_eq!(
            error_of(resp).await,
            (StatusCode::BAD_REQUEST, "invalid_request".to_string()),
            "{form:?}"
        );
    }

    proxy.stop().await.unwrap();
}

/// An empty verifier is refused before any lookup, leaving the code usable
#[tokio::test]
async fn test_empty_verifier_is_invalid_request() {
    let backend = spawn_backend().await;
    let proxy = spawn_proxy(common::config(backend, AuthMode::OAuth2)).await;
    let (verifier, challenge) = pkce::generate_pair();
    let code = common::authorize(&proxy, "ivanov", "secret", &challenge).await;

    let resp = token_request(
        &proxy,
        &[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", REDIRECT_URI),
            ("code_verifier", ""),
        ],
    )
    .await;
    assert_eq!(
        error_of(resp).await,
        (StatusCode::BAD_REQUEST, "invalid_request".to_string())
    );

    let resp = token_request(
        &proxy,
        &[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", REDIRECT_URI),
            ("code_verifier", &verifier),
        ],
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    proxy.stop().await.unwrap();
}

/// A short verifier is judged by the hash comparison alone
#[tokio::test]
async fn test_short_mismatched_verifier_is_invalid_grant() {
    let backend = spawn_backend().await;
    let proxy = spawn_proxy(common::config(backend, AuthMode::OAuth2)).await;
    let (_, challenge) = pkce::generate_pair();
    let code = common::authorize(&proxy, "ivanov", "secret", &challenge).await;

    let resp = token_request(
        &proxy,
        &[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", REDIRECT_URI),
            ("code_verifier", "too-short"),
        ],
    )
    .await;
    assert_eq!(
        error_of(resp).await,
        (StatusCode::BAD_REQUEST, "invalid_grant".to_string())
    );

    proxy.stop().await.unwrap();
}

/// A well-formed but wrong verifier is invalid_grant and burns the code
#[tokio::test]
async fn test_wrong_verifier_burns_code() {
    let backend = spawn_backend().await;
    let proxy = spawn_proxy(common::config(backend, AuthMode::OAuth2)).await;
    let (verifier, challenge) = pkce::generate_pair();
    let (other, _) = pkce::generate_pair();
    let code = common::authorize(&proxy, "ivanov", "secret", &challenge).await;

    for v in [other.as_str(), verifier.as_str()] {
        let resp = token_request(
            &proxy,
            &[
                ("grant_type", "authorization_code"),
                ("code", &code),
                ("redirect_uri", REDIRECT_URI),
                ("code_verifier", v),
            ],
        )
        .await;
        assert_eq!(
            error_of(resp).await,
            (StatusCode::BAD_REQUEST, "invalid_grant".to_string())
        );
    }

    proxy.stop().await.unwrap();
}

#[tokio::test]
async fn test_redirect_uri_mismatch_is_invalid_grant() {
    let backend = spawn_backend().await;
    let proxy = spawn_proxy(common::config(backend, AuthMode::OAuth2)).await;
    let (verifier, challenge) = pkce::generate_pair();
    let code = common::authorize(&proxy, "ivanov", "secret", &challenge).await;

    let resp = token_request(
        &proxy,
        &[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", "http://localhost:5173/callback/"),
            ("code_verifier", &verifier),
        ],
    )
    .await;
    assert_eq!(
        error_of(resp).await,
        (StatusCode::BAD_REQUEST, "invalid_grant".to_string())
    );

    proxy.stop().await.unwrap();
}

#[tokio::test]
async fn test_token_responses_are_not_cached() {
    let backend = spawn_backend().await;
    let proxy = spawn_proxy(common::config(backend, AuthMode::OAuth2)).await;
    let (verifier, challenge) = pkce::generate_pair();
    let code = common::authorize(&proxy, "ivanov", "secret", &challenge).await;

    let resp = token_request(
        &proxy,
        &[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", REDIRECT_URI),
            ("code_verifier", &verifier),
        ],
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[reqwest::header::CACHE_CONTROL], "no-store");
    assert_eq!(resp.headers()[reqwest::header::PRAGMA], "no-cache");

    let refused = token_request(&proxy, &[("grant_type", "nope")]).await;
    assert_eq!(refused.headers()[reqwest::header::CACHE_CONTROL], "no-store");

    proxy.stop().await.unwrap();
}

struct FailingStore;

#[async_trait]
impl<V: Clone + Send + Sync + 'static> ExpiringStore<V> for FailingStore {
    async fn put(&self, _: String, _: V, _: Duration) -> Result<()> {
        Err(Error::Storage("connection refused".into()))
    }
    async fn take_if_valid(&self, _: &str) -> Result<Option<V>> {
        Err(Error::Storage("connection refused".into()))
    }
    async fn peek_if_valid(&self, _: &str) -> Result<Option<V>> {
        Err(Error::Storage("connection refused".into()))
    }
    async fn sweep_expired(&self, _: SystemTime) -> Result<usize> {
        Err(Error::Storage("connection refused".into()))
    }
    async fn len(&self) -> Result<usize> {
        Err(Error::Storage("connection refused".into()))
    }
}

/// Storage faults surface as server errors, never as invalid_grant
#[tokio::test]
async fn test_storage_fault_is_server_error() {
    let backend = spawn_backend().await;
    let service = Arc::new(OAuth2Service::new(
        Arc::new(FailingStore),
        Arc::new(FailingStore),
        Arc::new(FailingStore),
        TokenLifetimes::default(),
    ));
    let proxy = spawn_proxy_with(common::config(backend, AuthMode::OAuth2), Some(service)).await;
    let (verifier, _) = pkce::generate_pair();

    let resp = token_request(
        &proxy,
        &[
            ("grant_type", "authorization_code"),
            ("code", "whatever"),
            ("redirect_uri", REDIRECT_URI),
            ("code_verifier", &verifier),
        ],
    )
    .await;
    assert_eq!(
        error_of(resp).await,
        (StatusCode::INTERNAL_SERVER_ERROR, "server_error".to_string())
    );

    let resp = token_request(
        &proxy,
        &[("grant_type", "refresh_token"), ("refresh_token", "whatever")],
    )
    .await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    // Bearer validation fails closed with 500, not 401
    let resp = common::call_mcp(&proxy, Some("whatever"), &serde_json::json!({"id": 1})).await;
    assert_eq!(
        error_of(resp).await,
        (StatusCode::INTERNAL_SERVER_ERROR, "server_error".to_string())
    );

    proxy.stop().await.unwrap();
}
