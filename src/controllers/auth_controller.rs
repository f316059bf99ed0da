use std::net::SocketAddr;

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::{
        header::{SET_COOKIE, USER_AGENT},
        HeaderMap, StatusCode,
    },
    response::{AppendHeaders, IntoResponse},
    Json,
};
use axum_macros::debug_handler;
use serde_json::json;

use crate::error::AppResult;
use crate::models::user::{LoginUser, PublicUser, RegisterUser, VerifyEmailRequest};
use crate::services::ClientInfo;
use crate::state::AppState;
use crate::utils::cookie::{clear_cookie, session_cookie, token_from_cookie};

// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterUser>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(req) = payload?;
    let registration = state.auth.register(req).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "user": registration.user,
            "verification_token": registration.verification_token,
        })),
    ))
}

// POST /auth/login
#[debug_handler]
pub async fn login(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Result<Json<LoginUser>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(req) = payload?;
    let client = client_info(&headers, connect_info.map(|ConnectInfo(addr)| addr));

    let success = state.auth.login(req, client).await?;
    let cookie = session_cookie(&state.cookie, &success.token);

    Ok((AppendHeaders([(SET_COOKIE, cookie)]), Json(success.user)))
}

// POST /auth/logout
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        AppendHeaders([(SET_COOKIE, clear_cookie(&state.cookie))]),
        Json(json!({ "status": "success", "message": "Logged out" })),
    )
}

// GET /auth/me
pub async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<PublicUser>> {
    let token = token_from_cookie(&headers, &state.cookie.name);
    Ok(Json(state.auth.current_user(token.as_deref()).await?))
}

// POST /auth/verify-email
pub async fn verify_email(
    State(state): State<AppState>,
    payload: Result<Json<VerifyEmailRequest>, JsonRejection>,
) -> AppResult<Json<PublicUser>> {
    let Json(req) = payload?;
    Ok(Json(state.auth.verify_email(&req.token).await?))
}

/// Client address for the login audit trail.
///
/// The first `X-Forwarded-For` hop wins over the socket peer.
fn client_info(headers: &HeaderMap, peer: Option<SocketAddr>) -> ClientInfo {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty());

    let ip = forwarded
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string());

    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    ClientInfo { ip, user_agent }
}
