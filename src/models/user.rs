use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
pub enum UserRole {
    User,
    Admin,
}

/// Account status. `pending` until the email is verified, `blocked` after lockout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "user_status", rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Pending,
    Blocked,
}

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub dni: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub role: UserRole,
    pub status: UserStatus,
    /// Set when an admin lifts a block; failures before it no longer count.
    pub lockout_reset_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row to insert; the password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub dni: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub role: UserRole,
    pub status: UserStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterUser {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub dni: String,
    pub phone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginUser {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserStatus {
    pub status: UserStatus,
}

/// What login hands back to the client; the token travels in the cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfileDto {
    pub id: Uuid,
    pub email: String,
    pub role: UserRole,
}

/// Public view of a user. Never carries the password hash.
#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub dni: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub role: UserRole,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            dni: user.dni,
            first_name: user.first_name,
            last_name: user.last_name,
            phone: user.phone,
            role: user.role,
            status: user.status,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

impl From<&User> for UserProfileDto {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            role: user.role,
        }
    }
}

/// Canonical form used for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Ana.Perez@Example.COM "), "ana.perez@example.com");
    }

    #[test]
    fn test_public_user_has_no_password() {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: "a@b.pe".into(),
            dni: "12345678".into(),
            password_hash: "$2b$10$secret".into(),
            first_name: "Ana".into(),
            last_name: "Perez".into(),
            phone: None,
            role: UserRole::User,
            status: UserStatus::Pending,
            lockout_reset_at: None,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(PublicUser::from(user)).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["status"], "pending");
        assert_eq!(json["role"], "user");
    }
}
