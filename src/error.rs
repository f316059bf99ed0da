use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors surfaced by the auth and wallet services.
///
/// Every variant carries a stable machine-readable [`code`](AppError::code)
/// that clients can switch on; the `Display` text is for humans.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed")]
    Validation(Vec<FieldError>),

    #[error("email is already registered")]
    EmailExists,

    #[error("dni is already registered")]
    DniExists,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("account is not active")]
    InactiveAccount,

    #[error("invalid or expired token")]
    InvalidToken,

    #[error("authentication required")]
    Unauthorized,

    #[error("insufficient permissions")]
    Forbidden,

    #[error("user not found")]
    UserNotFound,

    #[error("wallet not found")]
    WalletNotFound,

    #[error("user already has an open wallet")]
    WalletExists,

    #[error("wallet is not active")]
    WalletInactive,

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("transaction not found")]
    TransactionNotFound,

    #[error("transaction cannot be reversed")]
    TransactionNotReversible,

    /// Database unreachable or pool exhausted.
    #[error("service temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Shorthand for a validation error on a single field.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }

    #[inline]
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        Self::Internal(err.to_string())
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::EmailExists => "EMAIL_EXISTS",
            Self::DniExists => "DNI_EXISTS",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::InactiveAccount => "INACTIVE_ACCOUNT",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::WalletNotFound => "WALLET_NOT_FOUND",
            Self::WalletExists => "WALLET_EXISTS",
            Self::WalletInactive => "WALLET_INACTIVE",
            Self::InsufficientFunds => "INSUFFICIENT_FUNDS",
            Self::TransactionNotFound => "TRANSACTION_NOT_FOUND",
            Self::TransactionNotReversible => "TRANSACTION_NOT_REVERSIBLE",
            Self::Unavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InsufficientFunds => StatusCode::BAD_REQUEST,
            Self::InvalidCredentials | Self::InvalidToken | Self::Unauthorized => {
                StatusCode::UNAUTHORIZED
            }
            Self::InactiveAccount | Self::Forbidden => StatusCode::FORBIDDEN,
            Self::UserNotFound | Self::WalletNotFound | Self::TransactionNotFound => {
                StatusCode::NOT_FOUND
            }
            Self::EmailExists
            | Self::DniExists
            | Self::WalletExists
            | Self::WalletInactive
            | Self::TransactionNotReversible => StatusCode::CONFLICT,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::Unavailable(err.to_string())
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(err: bcrypt::BcryptError) -> Self {
        Self::Internal(format!("password hashing failed: {err}"))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::invalid("body", rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::invalid("query", rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Server-side failures are logged here and replaced by a generic message.
        let message = match &self {
            Self::Internal(detail) => {
                tracing::error!(code = self.code(), %detail, "request failed");
                "internal server error".to_string()
            }
            Self::Unavailable(detail) => {
                tracing::warn!(code = self.code(), %detail, "request failed");
                "service temporarily unavailable".to_string()
            }
            other => other.to_string(),
        };

        let body = match self {
            Self::Validation(details) => json!({
                "status": "error",
                "code": "VALIDATION_ERROR",
                "message": message,
                "details": details,
            }),
            other => json!({
                "status": "error",
                "code": other.code(),
                "message": message,
            }),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            AppError::invalid("email", "required").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::EmailExists.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::InvalidCredentials.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AppError::InactiveAccount.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::UserNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::InsufficientFunds.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Unavailable("pool".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::internal("boom").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_transient_database_errors_are_unavailable() {
        assert!(matches!(
            AppError::from(sqlx::Error::PoolTimedOut),
            AppError::Unavailable(_)
        ));
        assert!(matches!(
            AppError::from(sqlx::Error::RowNotFound),
            AppError::Internal(_)
        ));
    }

    #[tokio::test]
    async fn test_internal_details_are_not_leaked() {
        let response = AppError::internal("password column missing").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "INTERNAL_ERROR");
        assert!(!body["message"].as_str().unwrap().contains("password"));
    }

    #[tokio::test]
    async fn test_validation_response_carries_field_details() {
        let err = AppError::Validation(vec![
            FieldError::new("email", "is required"),
            FieldError::new("password", "must be at least 8 characters"),
        ]);
        let response = err.into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(body["details"][0]["field"], "email");
        assert_eq!(body["details"][1]["field"], "password");
    }
}
