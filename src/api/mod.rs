use std::sync::Arc;

use axum::{
    http::StatusCode,
    middleware,
    routing::{delete, get, post},
    Json, Router,
};
use tower_http::trace::TraceLayer;

use crate::middleware::auth::token_auth;
use crate::middleware::headers::{request_id_middleware, security_headers_middleware};
use crate::AppState;

pub mod handlers;

/// Token management routes. The caller mounts this under `/api/v1`.
/// Every route needs a valid session or API token; what the caller may do is
/// decided by the token's scopes. `/session` routes take session tokens only.
pub fn api_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/tokens",
            get(handlers::list_tokens).post(handlers::create_token),
        )
        .route(
            "/tokens/:id",
            get(handlers::get_token)
                .patch(handlers::update_token)
                .delete(handlers::revoke_token),
        )
        .route("/session", delete(handlers::logout))
        .route("/session/refresh", post(handlers::refresh_session))
        .layer(middleware::from_fn_with_state(state, token_auth))
        .fallback(fallback_404)
}

/// Full application: health check, `/api/v1`, tracing and response headers.
pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .nest("/api/v1", api_router(state.clone()))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id_middleware))
        .layer(middleware::from_fn(security_headers_middleware))
}

async fn fallback_404() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "error": {
                "message": "route not found",
                "type": "not_found_error",
                "code": "route_not_found",
            }
        })),
    )
}
