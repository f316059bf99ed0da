use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
    Router,
};

use crate::controllers::admin_controller::{
    reconcile, refund, reverse_transaction, set_user_status, set_wallet_status,
};
use crate::middleware::auth::{auth_middleware, require_admin};
use crate::state::AppState;

pub fn admin_routes(state: AppState) -> Router<AppState> {
    // The last layer added runs first, so the session is verified before the role.
    Router::new()
        .route("/transactions/:id/reverse", post(reverse_transaction))
        .route("/wallets/:id/refund", post(refund))
        .route("/wallets/:id/status", put(set_wallet_status))
        .route("/wallets/:id/reconcile", get(reconcile))
        .route("/users/:id/status", put(set_user_status))
        .layer(from_fn(require_admin))
        .layer(from_fn_with_state(state, auth_middleware))
}
