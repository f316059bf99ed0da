use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Extension, Json,
};
use axum_macros::debug_handler;
use tracing::info;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::auth::AuthPayload;
use crate::models::user::{PublicUser, UpdateUserStatus};
use crate::models::wallet::{AmountRequest, UpdateWalletStatus};
use crate::models::{PostedEntry, Reconciliation, Wallet};
use crate::state::AppState;

// POST /api/admin/transactions/:id/reverse
#[debug_handler]
pub async fn reverse_transaction(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthPayload>,
    Path(transaction_id): Path<Uuid>,
) -> AppResult<Json<PostedEntry>> {
    let posted = state.wallets.reverse_transaction(transaction_id).await?;
    info!(admin_id = %admin.user_id, %transaction_id, "reversal requested by admin");
    Ok(Json(posted))
}

// POST /api/admin/wallets/:id/refund
pub async fn refund(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthPayload>,
    Path(wallet_id): Path<Uuid>,
    payload: Result<Json<AmountRequest>, JsonRejection>,
) -> AppResult<Json<PostedEntry>> {
    let Json(req) = payload?;
    let posted = state
        .wallets
        .refund(wallet_id, req.amount, req.description, req.metadata)
        .await?;
    info!(admin_id = %admin.user_id, %wallet_id, "refund issued by admin");
    Ok(Json(posted))
}

// PUT /api/admin/wallets/:id/status
pub async fn set_wallet_status(
    State(state): State<AppState>,
    Path(wallet_id): Path<Uuid>,
    payload: Result<Json<UpdateWalletStatus>, JsonRejection>,
) -> AppResult<Json<Wallet>> {
    let Json(req) = payload?;
    Ok(Json(state.wallets.set_wallet_status(wallet_id, req.status).await?))
}

// GET /api/admin/wallets/:id/reconcile
pub async fn reconcile(
    State(state): State<AppState>,
    Path(wallet_id): Path<Uuid>,
) -> AppResult<Json<Reconciliation>> {
    Ok(Json(state.wallets.reconcile(wallet_id).await?))
}

// PUT /api/admin/users/:id/status
pub async fn set_user_status(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    payload: Result<Json<UpdateUserStatus>, JsonRejection>,
) -> AppResult<Json<PublicUser>> {
    let Json(req) = payload?;
    Ok(Json(state.auth.set_user_status(user_id, req.status).await?))
}
