use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::HeaderMap;

use crate::config::CookieConfig;
use crate::utils::auth_token::TOKEN_TTL_HOURS;

/// `Set-Cookie` value carrying a fresh session token.
pub fn session_cookie(config: &CookieConfig, token: &str) -> String {
    build(config, token, TOKEN_TTL_HOURS * 60 * 60)
}

/// `Set-Cookie` value that removes the session cookie.
pub fn clear_cookie(config: &CookieConfig) -> String {
    build(config, "", 0)
}

fn build(config: &CookieConfig, value: &str, max_age: i64) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; Path=/; Max-Age={}; SameSite=Strict",
        config.name, value, max_age
    );
    if config.secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Session token from the named cookie.
pub fn token_from_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Session token from the cookie, else from an `Authorization: Bearer` header.
pub fn session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    token_from_cookie(headers, cookie_name).or_else(|| {
        headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    })
}
