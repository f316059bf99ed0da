pub mod admin;
pub mod auth;
pub mod wallet;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// The complete HTTP application.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/auth", auth::auth_routes())
        .nest("/api", wallet::wallet_routes(state.clone()))
        .nest("/api/admin", admin::admin_routes(state.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Reports whether the backing store answers.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.auth.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(e) => {
            tracing::warn!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "error", "message": "database unavailable" })),
            )
        }
    }
}
