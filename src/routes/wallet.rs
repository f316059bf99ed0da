use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};

use crate::controllers::wallet_controller::{
    create_wallet, deposit, get_wallet, get_wallet_by_id, list_transactions, pay, withdraw,
};
use crate::middleware::auth::auth_middleware;
use crate::state::AppState;

pub fn wallet_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/wallet", get(get_wallet))
        .route("/wallets", post(create_wallet))
        .route("/wallets/:id", get(get_wallet_by_id))
        .route("/wallets/:id/deposit", post(deposit))
        .route("/wallets/:id/withdraw", post(withdraw))
        .route("/wallets/:id/pay", post(pay))
        .route("/wallets/:id/transactions", get(list_transactions))
        .layer(from_fn_with_state(state, auth_middleware))
}
