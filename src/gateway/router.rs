//! HTTP router and handlers

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State, rejection::JsonRejection},
    http::{HeaderValue, Method, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{debug, warn};

use super::auth::{AuthGate, RESOURCE_METADATA_PATH, bearer_auth_middleware};
use super::credentials::CredentialContext;
use super::oauth_routes::{OAuthRoutes, oauth_router};
use crate::Error;
use crate::backend::BackendClient;
use crate::config::{AuthMode, ServerConfig};
use crate::error::{rpc_codes, rpc_error_body};
use crate::oauth::Credentials;

/// Shared application state
pub struct AppState {
    /// 1C backend client
    pub backend: BackendClient,
    /// Bearer gate for protected paths
    pub auth_gate: Arc<AuthGate>,
    /// Authorization endpoints (oauth2 mode only)
    pub oauth_routes: Option<Arc<OAuthRoutes>>,
    /// Service name reported by `/` and `/health`
    pub service_name: String,
    /// Account `/health` checks the backend with (anonymous when unset)
    pub health_credentials: Option<Credentials>,
}

/// Create the router
pub fn create_router(state: Arc<AppState>, server: &ServerConfig) -> Router {
    let gate = Arc::clone(&state.auth_gate);
    let oauth_routes = state.oauth_routes.clone();

    let mut router = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/mcp", post(dispatch_handler))
        .with_state(state);

    if let Some(routes) = oauth_routes {
        router = router.merge(oauth_router(routes));
    }

    router
        // Authentication middleware (applied before other layers)
        .layer(middleware::from_fn_with_state(gate, bearer_auth_middleware))
        .layer(DefaultBodyLimit::max(server.max_body_size))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            server.request_timeout,
        ))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&server.cors_origins))
}

/// CORS policy from the configured origin list (`*` allows any origin).
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() || origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| HeaderValue::from_str(o.trim()).ok())
            .collect();
        if parsed.is_empty() {
            AllowOrigin::any()
        } else {
            AllowOrigin::list(parsed)
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .expose_headers([header::WWW_AUTHENTICATE])
}

/// `GET /`: service information
async fn root_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut endpoints = json!({
        "mcp": "/mcp",
        "health": "/health",
    });
    if state.auth_gate.mode() == AuthMode::OAuth2 {
        endpoints["authorize"] = json!("/authorize");
        endpoints["token"] = json!("/token");
        endpoints["resource_metadata"] = json!(RESOURCE_METADATA_PATH);
    }

    Json(json!({
        "name": state.service_name,
        "version": env!("CARGO_PKG_VERSION"),
        "description": "MCP proxy for 1C:Enterprise HTTP services",
        "auth_mode": state.auth_gate.mode().as_str(),
        "endpoints": endpoints,
    }))
}

/// `GET /health`: proxy liveness plus a health check of the 1C service.
async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    let checked = state.backend.health_check(state.health_credentials.as_ref()).await;

    let mut body = json!({
        "status": "ok",
        "name": state.service_name,
        "version": env!("CARGO_PKG_VERSION"),
        "auth_mode": state.auth_gate.mode().as_str(),
        "onec_connection": "ok",
    });

    let status = match checked {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            warn!(error = %e, "Backend health check failed");
            let connection = match &e {
                Error::BackendRejected(_) => "rejected",
                _ => "unreachable",
            };
            body["status"] = json!("unhealthy");
            body["onec_connection"] = json!(connection);
            body["error"] = json!(e.to_string());
            StatusCode::SERVICE_UNAVAILABLE
        }
    };

    (status, Json(body)).into_response()
}

/// `POST /mcp`: forward the JSON-RPC envelope to 1C with the request's
/// credentials and relay the reply.
async fn dispatch_handler(
    State(state): State<Arc<AppState>>,
    context: CredentialContext,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let envelope = match body {
        Ok(Json(v)) => v,
        Err(e) => {
            debug!(error = %e, "Rejected malformed JSON-RPC body");
            return rpc_error_response(
                StatusCode::BAD_REQUEST,
                rpc_codes::PARSE_ERROR,
                &format!("Parse error: {}", e.body_text()),
                Value::Null,
            );
        }
    };

    if !envelope.is_object() && !envelope.is_array() {
        return rpc_error_response(
            StatusCode::BAD_REQUEST,
            rpc_codes::INVALID_REQUEST,
            "Invalid Request: expected a JSON-RPC object or batch",
            Value::Null,
        );
    }

    match state.backend.forward(context.credentials(), &envelope).await {
        Ok(reply) => Json(reply).into_response(),
        Err(e) => {
            warn!(
                login = %context.credentials().login,
                source = ?context.source(),
                error = %e,
                "Backend call failed"
            );
            let id = envelope.get("id").cloned().unwrap_or(Value::Null);
            rpc_error_response(StatusCode::BAD_GATEWAY, e.to_rpc_code(), &e.to_string(), id)
        }
    }
}

fn rpc_error_response(status: StatusCode, code: i32, message: &str, id: Value) -> Response {
    (status, Json(rpc_error_body(code, message, id))).into_response()
}
