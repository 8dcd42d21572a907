use crate::rate_limit::RateLimiter;
use axum::{
    extract::{ConnectInfo, Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::warn;

/// Auth configuration for the gateway.
#[derive(Clone, Default)]
pub struct AuthConfig {
    /// API keys that are allowed in. Empty = no auth required.
    pub api_keys: Vec<String>,
}

impl AuthConfig {
    pub fn new(api_keys: Vec<String>) -> Self {
        Self { api_keys }
    }

    /// True when at least one key is configured.
    pub fn is_enabled(&self) -> bool {
        !self.api_keys.is_empty()
    }

    /// Whether `key` is one of the configured keys.
    pub fn accepts(&self, key: &str) -> bool {
        self.api_keys.iter().any(|k| k == key)
    }
}

/// Shared middleware state.
#[derive(Clone)]
pub struct MiddlewareState {
    /// Buckets shared by every request.
    pub rate_limiter: Arc<RateLimiter>,
    /// Keys accepted by [`auth_middleware`].
    pub auth: AuthConfig,
}

#[derive(serde::Deserialize, Default)]
pub struct AuthQuery {
    /// Key passed as `?api_key=`.
    pub api_key: Option<String>,
}

/// The key a request presents: `Authorization: Bearer <key>` first, then
/// `?api_key=<key>`. Browsers cannot set headers on WebSocket upgrades, hence
/// the query fallback.
fn presented_key(headers: &HeaderMap, query: &AuthQuery) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(ToString::to_string)
        .or_else(|| query.api_key.clone())
}

fn reject(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": code, "message": message })),
    )
        .into_response()
}

/// Rejects requests without a configured API key. A no-op when auth is off.
pub async fn auth_middleware(
    State(state): State<Arc<MiddlewareState>>,
    headers: HeaderMap,
    Query(query): Query<AuthQuery>,
    request: Request,
    next: Next,
) -> Response {
    if !state.auth.is_enabled() {
        return next.run(request).await;
    }

    match presented_key(&headers, &query) {
        Some(k) if state.auth.accepts(&k) => next.run(request).await,
        Some(_) => {
            warn!(path = %request.uri().path(), "Rejected request: invalid API key");
            reject(StatusCode::UNAUTHORIZED, "unauthorized", "Invalid API key")
        }
        None => {
            warn!(path = %request.uri().path(), "Rejected request: missing API key");
            reject(StatusCode::UNAUTHORIZED, "unauthorized", "API key required")
        }
    }
}

/// Bucket key for a request: a configured API key it presents, otherwise
/// the peer address. Unknown keys never get a bucket of their own.
fn client_key(
    auth: &AuthConfig,
    headers: &HeaderMap,
    query: &AuthQuery,
    request: &Request,
) -> String {
    if let Some(key) = presented_key(headers, query).filter(|k| auth.accepts(k)) {
        return format!("key:{key}");
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| format!("ip:{}", addr.ip()))
        .unwrap_or_else(|| "anonymous".to_string())
}

/// Token-bucket limiting per accepted API key, else per peer address.
/// Requests without connect info share one anonymous bucket.
pub async fn rate_limit_middleware(
    State(state): State<Arc<MiddlewareState>>,
    headers: HeaderMap,
    Query(query): Query<AuthQuery>,
    request: Request,
    next: Next,
) -> Response {
    let client = client_key(&state.auth, &headers, &query, &request);

    if !state.rate_limiter.check(&client).await {
        warn!(path = %request.uri().path(), client = %client, "Rate limited request");
        return reject(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limited",
            "Rate limit exceeded",
        );
    }

    next.run(request).await
}
