pub mod auth_token;
pub mod cookie;

pub use auth_token::{Claims, TokenKeys, VerificationClaims};
