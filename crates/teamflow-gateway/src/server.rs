use crate::api;
use crate::connection::ConnectionManager;
use crate::middleware::{auth_middleware, rate_limit_middleware, AuthConfig, MiddlewareState};
use crate::rate_limit::RateLimiter;
use crate::sanitizer::Sanitizer;
use crate::stream;
use axum::{
    middleware as axum_mw,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use teamflow_orchestrator::Orchestrator;

/// Shared application state.
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub connections: Arc<ConnectionManager>,
    pub sanitizer: Sanitizer,
}

/// The HTTP + WebSocket gateway.
pub struct GatewayServer;

impl GatewayServer {
    /// Build the gateway without auth or rate limiting.
    pub fn build(orchestrator: Arc<Orchestrator>) -> Router {
        Self::build_with_middleware(orchestrator, Sanitizer::default(), None, AuthConfig::default())
    }

    /// Build the gateway with optional rate limiting and auth middleware.
    pub fn build_with_middleware(
        orchestrator: Arc<Orchestrator>,
        sanitizer: Sanitizer,
        rate_limiter: Option<Arc<RateLimiter>>,
        auth_config: AuthConfig,
    ) -> Router {
        let state = Arc::new(AppState {
            orchestrator,
            connections: ConnectionManager::new(),
            sanitizer,
        });

        let app = Router::new()
            .route("/health", get(health_handler))
            .route("/api/tasks", post(api::submit_task).get(api::list_tasks))
            .route("/api/tasks/{id}", get(api::get_task))
            .route("/api/tasks/{id}/feedback", post(api::submit_feedback))
            .route("/api/teams", get(api::list_teams))
            .route("/api/stats", get(api::stats))
            .route("/ws/tasks/{id}", get(stream::stream_task))
            .with_state(state);

        if rate_limiter.is_some() || auth_config.is_enabled() {
            let mw_state = Arc::new(MiddlewareState {
                rate_limiter: rate_limiter
                    .unwrap_or_else(|| Arc::new(RateLimiter::new(1000.0, 1000.0))),
                auth: auth_config,
            });

            // auth runs first (outermost), so rejected keys never spend tokens
            app.layer(axum_mw::from_fn_with_state(
                mw_state.clone(),
                rate_limit_middleware,
            ))
            .layer(axum_mw::from_fn_with_state(mw_state, auth_middleware))
        } else {
            app
        }
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok", "service": "teamflow"}))
}
