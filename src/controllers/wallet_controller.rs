use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Extension, Json,
};
use axum_macros::debug_handler;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::auth::ensure_owner_or_admin;
use crate::models::auth::AuthPayload;
use crate::models::wallet::{AmountRequest, CreateWalletRequest};
use crate::models::{PostedEntry, Transaction, TransactionFilter, Wallet};
use crate::state::AppState;

// GET /api/wallet - Get or create the caller's wallet
#[debug_handler]
pub async fn get_wallet(
    State(state): State<AppState>,
    Extension(user): Extension<AuthPayload>,
) -> AppResult<Json<Wallet>> {
    let wallet = state.wallets.get_or_create_wallet(user.user_id).await?;
    Ok(Json(wallet))
}

// POST /api/wallets
pub async fn create_wallet(
    State(state): State<AppState>,
    Extension(user): Extension<AuthPayload>,
    payload: Option<Json<CreateWalletRequest>>,
) -> AppResult<(StatusCode, Json<Wallet>)> {
    let req = payload.map(|Json(req)| req).unwrap_or_default();
    let wallet = state
        .wallets
        .create_wallet(user.user_id, req.currency.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(wallet)))
}

// GET /api/wallets/:id
pub async fn get_wallet_by_id(
    State(state): State<AppState>,
    Extension(user): Extension<AuthPayload>,
    Path(wallet_id): Path<Uuid>,
) -> AppResult<Json<Wallet>> {
    let wallet = owned_wallet(&state, &user, wallet_id).await?;
    Ok(Json(wallet))
}

// POST /api/wallets/:id/deposit
#[debug_handler]
pub async fn deposit(
    State(state): State<AppState>,
    Extension(user): Extension<AuthPayload>,
    Path(wallet_id): Path<Uuid>,
    payload: Result<Json<AmountRequest>, JsonRejection>,
) -> AppResult<Json<PostedEntry>> {
    let Json(req) = payload?;
    owned_wallet(&state, &user, wallet_id).await?;

    let posted = state
        .wallets
        .deposit(wallet_id, req.amount, req.description, req.metadata)
        .await?;
    Ok(Json(posted))
}

// POST /api/wallets/:id/withdraw
#[debug_handler]
pub async fn withdraw(
    State(state): State<AppState>,
    Extension(user): Extension<AuthPayload>,
    Path(wallet_id): Path<Uuid>,
    payload: Result<Json<AmountRequest>, JsonRejection>,
) -> AppResult<Json<PostedEntry>> {
    let Json(req) = payload?;
    owned_wallet(&state, &user, wallet_id).await?;

    let posted = state
        .wallets
        .withdraw(wallet_id, req.amount, req.description, req.metadata)
        .await?;
    Ok(Json(posted))
}

// POST /api/wallets/:id/pay
pub async fn pay(
    State(state): State<AppState>,
    Extension(user): Extension<AuthPayload>,
    Path(wallet_id): Path<Uuid>,
    payload: Result<Json<AmountRequest>, JsonRejection>,
) -> AppResult<Json<PostedEntry>> {
    let Json(req) = payload?;
    owned_wallet(&state, &user, wallet_id).await?;

    let posted = state
        .wallets
        .pay(wallet_id, req.amount, req.description, req.metadata)
        .await?;
    Ok(Json(posted))
}

// GET /api/wallets/:id/transactions?type=&status=&from=&to=&limit=&offset=
pub async fn list_transactions(
    State(state): State<AppState>,
    Extension(user): Extension<AuthPayload>,
    Path(wallet_id): Path<Uuid>,
    filter: Result<Query<TransactionFilter>, QueryRejection>,
) -> AppResult<Json<Vec<Transaction>>> {
    let Query(filter) = filter?;
    owned_wallet(&state, &user, wallet_id).await?;

    let transactions = state.wallets.get_transactions(wallet_id, &filter).await?;
    Ok(Json(transactions))
}

async fn owned_wallet(state: &AppState, user: &AuthPayload, wallet_id: Uuid) -> AppResult<Wallet> {
    let wallet = state.wallets.get_wallet(wallet_id).await?;
    ensure_owner_or_admin(user, wallet.user_id)?;
    Ok(wallet)
}
