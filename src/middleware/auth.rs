use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
    Extension,
};
use tracing::debug;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::auth::AuthPayload;
use crate::state::AppState;
use crate::utils::cookie::session_token;

/// Require a valid session, from the `auth_token` cookie or a Bearer header.
///
/// On success the decoded [`AuthPayload`] is inserted into the request
/// extensions for handlers to extract.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = session_token(req.headers(), &state.cookie.name).ok_or(AppError::Unauthorized)?;

    let payload = state.auth.verify_token(&token)?.payload()?;
    debug!(user_id = %payload.user_id, "session verified");

    req.extensions_mut().insert(payload);
    Ok(next.run(req).await)
}

/// Layered after [`auth_middleware`]: reject non-admin sessions.
pub async fn require_admin(
    Extension(user): Extension<AuthPayload>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !user.is_admin() {
        return Err(AppError::Forbidden);
    }
    Ok(next.run(req).await)
}

/// Allow the owner of a resource, or any admin.
pub fn ensure_owner_or_admin(user: &AuthPayload, owner_id: Uuid) -> AppResult<()> {
    if user.user_id == owner_id || user.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}
