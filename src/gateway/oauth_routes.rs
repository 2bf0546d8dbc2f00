//! OAuth2 authorization server endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/authorize` | Login form for the 1C user |
//! | `POST` | `/authorize` | Check credentials against 1C, redirect with a code |
//! | `POST` | `/token` | `authorization_code` and `refresh_token` grants |
//! | `GET` | `/.well-known/oauth-protected-resource` | RFC 9728 metadata |
//!
//! The login form collects the user's 1C login and password. They are checked
//! with a health check against the backend before a code is issued, and the
//! resulting tokens are bound to them.

use std::sync::Arc;

use axum::{
    Form, Json, Router,
    extract::{Query, State, rejection::FormRejection},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info, warn};
use url::Url;

use super::auth::RESOURCE_METADATA_PATH;
use crate::backend::BackendClient;
use crate::oauth::{
    Credentials, OAuth2Service, OAuthError, TokenGrant,
    pkce::{self, ChallengeMethod},
};
use crate::Error;

/// Shared state of the authorization endpoints
pub struct OAuthRoutes {
    service: Arc<OAuth2Service>,
    backend: BackendClient,
    public_url: String,
    service_name: String,
}

impl OAuthRoutes {
    /// Create the endpoint state.
    #[must_use]
    pub fn new(
        service: Arc<OAuth2Service>,
        backend: BackendClient,
        public_url: &str,
        service_name: &str,
    ) -> Self {
        Self {
            service,
            backend,
            public_url: public_url.trim_end_matches('/').to_string(),
            service_name: service_name.to_string(),
        }
    }
}

/// Build the router for the authorization endpoints.
pub fn oauth_router(state: Arc<OAuthRoutes>) -> Router {
    Router::new()
        .route("/authorize", get(authorize_form).post(authorize_submit))
        .route("/token", axum::routing::post(token_handler))
        .route(RESOURCE_METADATA_PATH, get(resource_metadata))
        // RFC 9728 path-suffixed form, e.g. /.well-known/oauth-protected-resource/mcp
        .route(
            &format!("{RESOURCE_METADATA_PATH}/{{*resource}}"),
            get(resource_metadata),
        )
        .with_state(state)
}

// ── Request / Response types ───────────────────────────────────────────────

/// Parameters of `GET /authorize` and the fields of the login form.
#[derive(Debug, Default, Deserialize)]
pub struct AuthorizeParams {
    response_type: Option<String>,
    client_id: Option<String>,
    redirect_uri: Option<String>,
    state: Option<String>,
    code_challenge: Option<String>,
    code_challenge_method: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

/// Client parameters that passed validation.
struct ValidatedRequest<'a> {
    redirect_uri: &'a str,
    state: Option<&'a str>,
    code_challenge: &'a str,
    method: ChallengeMethod,
}

/// `POST /token` form body.
#[derive(Debug, Default, Deserialize)]
pub struct TokenRequest {
    grant_type: Option<String>,
    code: Option<String>,
    redirect_uri: Option<String>,
    code_verifier: Option<String>,
    refresh_token: Option<String>,
    client_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct TokenResponse {
    #[serde(flatten)]
    grant: TokenGrant,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        (
            self.status(),
            [(header::CACHE_CONTROL, "no-store")],
            Json(json!({
                "error": self.error_code(),
                "error_description": self.to_string(),
            })),
        )
            .into_response()
    }
}

// ── Handlers ────────────────────────────────────────────────────────────────

/// `GET /authorize`: render the login form.
async fn authorize_form(
    State(routes): State<Arc<OAuthRoutes>>,
    Query(params): Query<AuthorizeParams>,
) -> Response {
    match params.response_type.as_deref().map(str::trim) {
        None | Some("") => return html_error(&OAuthError::missing("response_type")),
        Some("code") => {}
        Some(other) => return html_error(&OAuthError::UnsupportedResponseType(other.to_string())),
    }

    let validated = match validate_client_params(&params) {
        Ok(v) => v,
        Err(e) => return html_error(&e),
    };

    debug!(
        client_id = params.client_id.as_deref().unwrap_or("-"),
        redirect_uri = %validated.redirect_uri,
        "Rendering login form"
    );
    Html(login_page(&routes.service_name, &params, &validated, None)).into_response()
}

/// `POST /authorize`: check credentials and redirect back with a code.
async fn authorize_submit(
    State(routes): State<Arc<OAuthRoutes>>,
    form: Result<Form<AuthorizeParams>, FormRejection>,
) -> Response {
    let Ok(Form(params)) = form else {
        return html_error(&OAuthError::InvalidRequest("Malformed form body".to_string()));
    };

    let validated = match validate_client_params(&params) {
        Ok(v) => v,
        Err(e) => return html_error(&e),
    };

    let (Some(username), Some(password)) = (
        non_empty(params.username.as_deref()),
        params.password.as_deref(),
    ) else {
        return html_error(&OAuthError::InvalidRequest(
            "Username and password are required".to_string(),
        ));
    };
    let credentials = Credentials::new(username, password);

    match routes.backend.check_credentials(&credentials).await {
        Ok(()) => {}
        Err(Error::BackendRejected(status)) => {
            warn!(login = %username, status, "Backend rejected credentials");
            let page = login_page(
                &routes.service_name,
                &params,
                &validated,
                Some(&OAuthError::InvalidCredentials.to_string()),
            );
            return (StatusCode::UNAUTHORIZED, Html(page)).into_response();
        }
        Err(e) => {
            error!(error = %e, "Backend unavailable during login");
            return html_error(&OAuthError::UpstreamUnavailable(
                "The 1C server could not be reached. Try again later.".to_string(),
            ));
        }
    }

    let code = match routes
        .service
        .generate_authorization_code(credentials, validated.redirect_uri, validated.code_challenge)
        .await
    {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Failed to store authorization code");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(error_page("server_error", "Internal server error")),
            )
                .into_response();
        }
    };

    match redirect_location(validated.redirect_uri, &code, validated.state) {
        Ok(location) => {
            info!(login = %username, "Authorization code issued");
            (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
        }
        Err(e) => html_error(&e),
    }
}

/// `POST /token`
async fn token_handler(
    State(routes): State<Arc<OAuthRoutes>>,
    form: Result<Form<TokenRequest>, FormRejection>,
) -> Response {
    let Ok(Form(req)) = form else {
        return OAuthError::InvalidRequest(
            "Expected an application/x-www-form-urlencoded body".to_string(),
        )
        .into_response();
    };

    if let Some(ref client_id) = req.client_id {
        debug!(client_id = %client_id, "Token request");
    }

    match exchange(&routes.service, &req).await {
        Ok(grant) => {
            let scope = non_empty(Some(routes.service.scope())).map(str::to_string);
            (
                StatusCode::OK,
                [
                    (header::CACHE_CONTROL, "no-store"),
                    (header::PRAGMA, "no-cache"),
                ],
                Json(TokenResponse { grant, scope }),
            )
                .into_response()
        }
        Err(TokenFailure::OAuth(e)) => {
            debug!(error = e.error_code(), "Token request refused");
            e.into_response()
        }
        Err(TokenFailure::Server(e)) => {
            error!(error = %e, "Token endpoint storage failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CACHE_CONTROL, "no-store")],
                Json(json!({ "error": "server_error" })),
            )
                .into_response()
        }
    }
}

/// `GET /.well-known/oauth-protected-resource`
async fn resource_metadata(State(routes): State<Arc<OAuthRoutes>>) -> impl IntoResponse {
    Json(routes.service.generate_prm_document(&routes.public_url))
}

// ── Grant processing ────────────────────────────────────────────────────────

enum TokenFailure {
    OAuth(OAuthError),
    Server(Error),
}

impl From<OAuthError> for TokenFailure {
    fn from(e: OAuthError) -> Self {
        Self::OAuth(e)
    }
}

impl From<Error> for TokenFailure {
    fn from(e: Error) -> Self {
        Self::Server(e)
    }
}

async fn exchange(service: &OAuth2Service, req: &TokenRequest) -> Result<TokenGrant, TokenFailure> {
    let grant_type = required(req.grant_type.as_deref(), "grant_type")?;

    let outcome = match grant_type {
        "authorization_code" => {
            let code = required(req.code.as_deref(), "code")?;
            let redirect_uri = required(req.redirect_uri.as_deref(), "redirect_uri")?;
            // Verifier syntax is not enforced here: the PKCE hash comparison
            // in the service is the only check
            let verifier = required(req.code_verifier.as_deref(), "code_verifier")?;
            service
                .exchange_code_for_tokens(code, redirect_uri, verifier)
                .await?
        }
        "refresh_token" => {
            let refresh_token = required(req.refresh_token.as_deref(), "refresh_token")?;
            service.refresh_tokens(refresh_token).await?
        }
        other => return Err(OAuthError::UnsupportedGrantType(other.to_string()).into()),
    };

    outcome.ok_or(TokenFailure::OAuth(OAuthError::InvalidGrant))
}

fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, OAuthError> {
    non_empty(value).ok_or_else(|| OAuthError::missing(name))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Validate the client-supplied parameters shared by GET and POST.
fn validate_client_params(params: &AuthorizeParams) -> Result<ValidatedRequest<'_>, OAuthError> {
    let redirect_uri = required(params.redirect_uri.as_deref(), "redirect_uri")?;
    let parsed = Url::parse(redirect_uri)
        .map_err(|_| OAuthError::InvalidRequest("redirect_uri must be an absolute URL".to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(OAuthError::InvalidRequest(
            "redirect_uri must use http or https".to_string(),
        ));
    }

    let code_challenge = required(params.code_challenge.as_deref(), "code_challenge")?;
    // An S256 challenge is itself base64url text within the verifier alphabet
    if !pkce::is_valid_verifier(code_challenge) {
        return Err(OAuthError::InvalidRequest("Malformed code_challenge".to_string()));
    }

    let method = ChallengeMethod::parse_optional(params.code_challenge_method.as_deref())?;

    Ok(ValidatedRequest {
        redirect_uri,
        state: non_empty(params.state.as_deref()),
        code_challenge,
        method,
    })
}

/// Append `code` (and `state`, when present) to the redirect URI, keeping
/// any query parameters it already has.
fn redirect_location(redirect_uri: &str, code: &str, state: Option<&str>) -> Result<String, OAuthError> {
    let mut url = Url::parse(redirect_uri)
        .map_err(|_| OAuthError::InvalidRequest("redirect_uri must be an absolute URL".to_string()))?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("code", code);
        if let Some(state) = state {
            pairs.append_pair("state", state);
        }
    }
    Ok(url.into())
}

// ── HTML pages ──────────────────────────────────────────────────────────────

fn html_error(err: &OAuthError) -> Response {
    (err.status(), Html(error_page(err.error_code(), &err.to_string()))).into_response()
}

/// Escape text for interpolation into HTML content and attribute values.
fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

const PAGE_STYLE: &str = r"
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            min-height: 100vh;
            margin: 0;
            background: #f3f4f6;
        }
        .container {
            padding: 2rem;
            background: white;
            border-radius: 12px;
            box-shadow: 0 4px 24px rgba(0,0,0,0.08);
            width: 340px;
        }
        h1 { margin: 0 0 1rem 0; font-size: 1.4rem; }
        label { display: block; margin-top: 0.75rem; font-size: 0.9rem; }
        input[type=text], input[type=password] {
            width: 100%; box-sizing: border-box; padding: 0.5rem; margin-top: 0.25rem;
        }
        button { margin-top: 1.25rem; width: 100%; padding: 0.6rem; }
        .error { color: #c0392b; margin-bottom: 0.5rem; }
        .error-code { font-family: monospace; margin-top: 1rem; opacity: 0.7; }
";

fn login_page(
    service_name: &str,
    params: &AuthorizeParams,
    validated: &ValidatedRequest<'_>,
    error: Option<&str>,
) -> String {
    let hidden = |name: &str, value: &str| {
        format!(
            r#"<input type="hidden" name="{name}" value="{}">"#,
            escape_html(value)
        )
    };

    let mut fields = vec![
        hidden("response_type", "code"),
        hidden("redirect_uri", validated.redirect_uri),
        hidden("code_challenge", validated.code_challenge),
        hidden("code_challenge_method", validated.method.as_str()),
    ];
    if let Some(state) = validated.state {
        fields.push(hidden("state", state));
    }
    if let Some(client_id) = non_empty(params.client_id.as_deref()) {
        fields.push(hidden("client_id", client_id));
    }
    let fields = fields.join("\n            ");

    let error_html = error.map_or_else(String::new, |e| {
        format!(r#"<p class="error">{}</p>"#, escape_html(e))
    });
    let username = escape_html(params.username.as_deref().unwrap_or_default());
    let title = escape_html(service_name);

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{title}: sign in</title>
    <style>{PAGE_STYLE}</style>
</head>
<body>
    <div class="container">
        <h1>Sign in to 1C:Enterprise</h1>
        {error_html}
        <form method="post" action="/authorize">
            {fields}
            <label>Username
                <input type="text" name="username" value="{username}" autocomplete="username" required autofocus>
            </label>
            <label>Password
                <input type="password" name="password" autocomplete="current-password">
            </label>
            <button type="submit">Sign in</button>
        </form>
    </div>
</body>
</html>"#
    )
}

fn error_page(error: &str, description: &str) -> String {
    let error = escape_html(error);
    let description = escape_html(description);
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Authorization Failed</title>
    <style>{PAGE_STYLE}</style>
</head>
<body>
    <div class="container">
        <h1>Authorization Failed</h1>
        <p>{description}</p>
        <p class="error-code">Error: {error}</p>
    </div>
</body>
</html>"#
    )
}
