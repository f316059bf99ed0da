use axum::{
    routing::{get, post},
    Router,
};

use crate::controllers::auth_controller::{login, logout, me, register, verify_email};
use crate::state::AppState;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/verify-email", post(verify_email))
        .route("/me", get(me))
}
