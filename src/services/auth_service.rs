use std::sync::Arc;

use tokio::task;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{BCRYPT_COST, MIN_PASSWORD_LEN};
use crate::error::{AppError, AppResult, FieldError};
use crate::models::user::{normalize_email, LoginUser, RegisterUser};
use crate::models::{
    AttemptOutcome, LockoutPolicy, NewLoginAttempt, NewUser, PublicUser, UserProfileDto, UserRole,
    UserStatus,
};
use crate::store::UserStore;
use crate::utils::{Claims, TokenKeys};

/// Where a login request came from.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub ip: String,
    pub user_agent: Option<String>,
}

#[derive(Debug)]
pub struct Registration {
    pub user: PublicUser,
    pub verification_token: String,
}

#[derive(Debug)]
pub struct LoginSuccess {
    pub user: UserProfileDto,
    pub token: String,
}

/// Credentials, sessions, lockout and registration.
pub struct AuthService {
    users: Arc<dyn UserStore>,
    tokens: TokenKeys,
    lockout: LockoutPolicy,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, tokens: TokenKeys, lockout: LockoutPolicy) -> Self {
        Self {
            users,
            tokens,
            lockout,
        }
    }

    pub async fn ping(&self) -> AppResult<()> {
        self.users.ping().await
    }

    pub async fn register(&self, req: RegisterUser) -> AppResult<Registration> {
        validate_registration(&req)?;

        let email = normalize_email(&req.email);
        if self.users.find_user_by_email(&email).await?.is_some() {
            return Err(AppError::EmailExists);
        }

        let password_hash = hash_password(req.password).await?;

        let user = self
            .users
            .insert_user(NewUser {
                email,
                dni: req.dni.trim().to_string(),
                password_hash,
                first_name: req.first_name.trim().to_string(),
                last_name: req.last_name.trim().to_string(),
                phone: req
                    .phone
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty()),
                role: UserRole::User,
                status: UserStatus::Pending,
            })
            .await?;

        let verification_token = self.tokens.issue_verification(&user.email)?;
        info!(user_id = %user.id, "user registered");

        Ok(Registration {
            user: user.into(),
            verification_token,
        })
    }

    pub async fn login(&self, req: LoginUser, client: ClientInfo) -> AppResult<LoginSuccess> {
        let mut missing = Vec::new();
        if req.email.trim().is_empty() {
            missing.push(FieldError::new("email", "is required"));
        }
        if req.password.is_empty() {
            missing.push(FieldError::new("password", "is required"));
        }
        if !missing.is_empty() {
            return Err(AppError::Validation(missing));
        }

        let email = normalize_email(&req.email);
        let attempt = |success: bool, user_id: Option<Uuid>| NewLoginAttempt {
            ip: client.ip.clone(),
            email: email.clone(),
            success,
            user_id,
            user_agent: client.user_agent.clone(),
        };

        let Some(user) = self.users.find_user_by_email(&email).await? else {
            // Same bcrypt cost as a real check, so timing does not reveal registered emails.
            let _ = verify_password(req.password, DUMMY_HASH.to_string()).await;
            self.record_login_attempt(attempt(false, None)).await?;
            warn!(ip = %client.ip, "login failed: unknown email");
            return Err(AppError::InvalidCredentials);
        };

        if user.status != UserStatus::Active {
            self.record_login_attempt(attempt(false, Some(user.id))).await?;
            warn!(user_id = %user.id, status = ?user.status, "login refused: inactive account");
            return Err(AppError::InactiveAccount);
        }

        if !verify_password(req.password, user.password_hash.clone()).await? {
            self.record_login_attempt(attempt(false, Some(user.id))).await?;
            warn!(user_id = %user.id, ip = %client.ip, "login failed: wrong password");
            return Err(AppError::InvalidCredentials);
        }

        let token = self.tokens.issue_session(user.id, user.role)?;
        self.record_login_attempt(attempt(true, Some(user.id))).await?;
        info!(user_id = %user.id, "login succeeded");

        Ok(LoginSuccess {
            user: UserProfileDto::from(&user),
            token,
        })
    }

    /// Append an attempt and block the account if the policy says so.
    pub async fn record_login_attempt(&self, attempt: NewLoginAttempt) -> AppResult<AttemptOutcome> {
        let user_id = attempt.user_id;
        let outcome = self
            .users
            .record_login_attempt(attempt, &self.lockout)
            .await?;

        if outcome == AttemptOutcome::Locked {
            warn!(
                user_id = ?user_id,
                max_failed_attempts = self.lockout.max_failed_attempts,
                "account blocked after repeated failed logins"
            );
        }
        Ok(outcome)
    }

    pub fn verify_token(&self, token: &str) -> AppResult<Claims> {
        self.tokens.verify_session(token)
    }

    /// Resolve the user behind a session token.
    pub async fn current_user(&self, token: Option<&str>) -> AppResult<PublicUser> {
        let token = token.ok_or(AppError::Unauthorized)?;
        let payload = self.verify_token(token)?.payload()?;

        self.users
            .find_user_by_id(payload.user_id)
            .await?
            .map(PublicUser::from)
            .ok_or(AppError::UserNotFound)
    }

    /// Activate a pending account from its verification token.
    pub async fn verify_email(&self, token: &str) -> AppResult<PublicUser> {
        let claims = self.tokens.verify_verification(token)?;
        let user = self
            .users
            .find_user_by_email(&normalize_email(&claims.email))
            .await?
            .ok_or(AppError::UserNotFound)?;

        match user.status {
            UserStatus::Active => Ok(user.into()),
            UserStatus::Blocked => Err(AppError::InactiveAccount),
            UserStatus::Pending => {
                let user = self.users.set_user_status(user.id, UserStatus::Active).await?;
                info!(user_id = %user.id, "email verified");
                Ok(user.into())
            }
        }
    }

    /// Administrative status change, e.g. unblocking a locked account.
    pub async fn set_user_status(&self, id: Uuid, status: UserStatus) -> AppResult<PublicUser> {
        let user = self.users.set_user_status(id, status).await?;
        info!(user_id = %user.id, status = ?status, "user status changed");
        Ok(user.into())
    }
}

fn validate_registration(req: &RegisterUser) -> AppResult<()> {
    let mut errors = Vec::new();

    let email = req.email.trim();
    if email.is_empty() {
        errors.push(FieldError::new("email", "is required"));
    } else if !looks_like_email(email) {
        errors.push(FieldError::new("email", "is not a valid email address"));
    }

    if req.password.is_empty() {
        errors.push(FieldError::new("password", "is required"));
    } else if req.password.chars().count() < MIN_PASSWORD_LEN {
        errors.push(FieldError::new(
            "password",
            format!("must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }

    for (field, value) in [("first_name", &req.first_name), ("last_name", &req.last_name)] {
        if value.trim().is_empty() {
            errors.push(FieldError::new(field, "is required"));
        }
    }

    let dni = req.dni.trim();
    if dni.is_empty() {
        errors.push(FieldError::new("dni", "is required"));
    } else if !dni.chars().all(|c| c.is_ascii_alphanumeric()) {
        errors.push(FieldError::new("dni", "must be alphanumeric"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && domain.contains('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}

/// Well-formed cost-10 hash that matches no password in use.
const DUMMY_HASH: &str = "$2b$10$N9qo8uLOickgx2ZMRZoMyeIjZAgcfl7p92ldGxad68LJZdL17lhWy";

// bcrypt is deliberately slow; keep it off the async workers.
async fn hash_password(password: String) -> AppResult<String> {
    task::spawn_blocking(move || bcrypt::hash(password, BCRYPT_COST))
        .await
        .map_err(AppError::internal)?
        .map_err(AppError::from)
}

async fn verify_password(password: String, hash: String) -> AppResult<bool> {
    task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(AppError::internal)?
        .map_err(AppError::from)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::store::MemoryStore;

    fn service_with(lockout: LockoutPolicy) -> (Arc<MemoryStore>, AuthService) {
        let store = Arc::new(MemoryStore::new());
        let service = AuthService::new(store.clone(), TokenKeys::new("test-secret"), lockout);
        (store, service)
    }

    fn service() -> (Arc<MemoryStore>, AuthService) {
        service_with(LockoutPolicy::default())
    }

    fn client() -> ClientInfo {
        ClientInfo {
            ip: "10.0.0.7".into(),
            user_agent: Some("test-agent".into()),
        }
    }

    fn registration(email: &str, dni: &str) -> RegisterUser {
        RegisterUser {
            email: email.into(),
            password: "correct horse".into(),
            first_name: "Ana".into(),
            last_name: "Quispe".into(),
            dni: dni.into(),
            phone: None,
        }
    }

    fn login(email: &str, password: &str) -> LoginUser {
        LoginUser {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Register and verify a user so it can log in.
    async fn active_user(service: &AuthService, email: &str, dni: &str) -> PublicUser {
        let reg = service.register(registration(email, dni)).await.unwrap();
        service.verify_email(&reg.verification_token).await.unwrap()
    }

    #[tokio::test]
    async fn test_register_hashes_password_and_starts_pending() {
        let (store, service) = service();
        let reg = service
            .register(registration("Ana@Example.com", "12345678"))
            .await
            .unwrap();

        assert_eq!(reg.user.email, "ana@example.com");
        assert_eq!(reg.user.status, UserStatus::Pending);
        assert_eq!(reg.user.role, UserRole::User);

        let stored = store
            .find_user_by_email("ana@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_ne!(stored.password_hash, "correct horse");
        assert!(bcrypt::verify("correct horse", &stored.password_hash).unwrap());

        let claims = service
            .tokens
            .verify_verification(&reg.verification_token)
            .unwrap();
        assert_eq!(claims.email, "ana@example.com");
    }

    #[tokio::test]
    async fn test_register_validation() {
        let (_, service) = service();
        let mut req = registration("not-an-email", "");
        req.password = "short".into();
        req.first_name = "  ".into();

        let Err(AppError::Validation(errors)) = service.register(req).await else {
            panic!("expected validation error");
        };
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, ["email", "password", "first_name", "dni"]);
    }

    #[tokio::test]
    async fn test_register_duplicate_email_and_dni() {
        let (_, service) = service();
        service
            .register(registration("ana@example.com", "12345678"))
            .await
            .unwrap();

        let dup_email = service
            .register(registration("ANA@example.com", "87654321"))
            .await;
        assert!(matches!(dup_email, Err(AppError::EmailExists)));

        let dup_dni = service
            .register(registration("other@example.com", "12345678"))
            .await;
        assert!(matches!(dup_dni, Err(AppError::DniExists)));
    }

    #[tokio::test]
    async fn test_login_requires_both_fields() {
        let (store, service) = service();
        let result = service.login(login("", ""), client()).await;
        let Err(AppError::Validation(errors)) = result else {
            panic!("expected validation error");
        };
        assert_eq!(errors.len(), 2);
        assert!(store.login_attempts_for_email("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_login_unknown_email_records_failure() {
        let (store, service) = service();
        let result = service
            .login(login("ghost@example.com", "whatever1"), client())
            .await;
        assert!(matches!(result, Err(AppError::InvalidCredentials)));

        let attempts = store
            .login_attempts_for_email("ghost@example.com")
            .await
            .unwrap();
        assert_eq!(attempts.len(), 1);
        assert!(!attempts[0].success);
        assert_eq!(attempts[0].user_id, None);
        assert_eq!(attempts[0].ip, "10.0.0.7");
        assert_eq!(attempts[0].user_agent.as_deref(), Some("test-agent"));
    }

    #[tokio::test]
    async fn test_pending_user_cannot_login() {
        let (store, service) = service();
        service
            .register(registration("ana@example.com", "12345678"))
            .await
            .unwrap();

        let result = service
            .login(login("ana@example.com", "correct horse"), client())
            .await;
        assert!(matches!(result, Err(AppError::InactiveAccount)));

        let attempts = store
            .login_attempts_for_email("ana@example.com")
            .await
            .unwrap();
        assert_eq!(attempts.len(), 1);
        assert!(attempts[0].user_id.is_some());
    }

    #[tokio::test]
    async fn test_login_success_issues_session() {
        let (store, service) = service();
        let user = active_user(&service, "ana@example.com", "12345678").await;

        let ok = service
            .login(login(" ANA@example.com ", "correct horse"), client())
            .await
            .unwrap();
        assert_eq!(ok.user.id, user.id);
        assert_eq!(ok.user.email, "ana@example.com");
        assert_eq!(ok.user.role, UserRole::User);

        let claims = service.verify_token(&ok.token).unwrap();
        assert_eq!(claims.sub, user.id.to_string());

        let attempts = store
            .login_attempts_for_email("ana@example.com")
            .await
            .unwrap();
        assert!(attempts[0].success);
    }

    #[tokio::test]
    async fn test_five_failures_block_account() {
        let (_, service) = service();
        active_user(&service, "ana@example.com", "12345678").await;

        for _ in 0..4 {
            let result = service
                .login(login("ana@example.com", "wrong password"), client())
                .await;
            assert!(matches!(result, Err(AppError::InvalidCredentials)));
        }

        // fifth failure trips the lock
        let result = service
            .login(login("ana@example.com", "wrong password"), client())
            .await;
        assert!(matches!(result, Err(AppError::InvalidCredentials)));

        let result = service
            .login(login("ana@example.com", "correct horse"), client())
            .await;
        assert!(matches!(result, Err(AppError::InactiveAccount)));
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let (_, service) = service();
        active_user(&service, "ana@example.com", "12345678").await;

        for _ in 0..4 {
            let _ = service
                .login(login("ana@example.com", "wrong password"), client())
                .await;
        }
        service
            .login(login("ana@example.com", "correct horse"), client())
            .await
            .unwrap();
        for _ in 0..4 {
            let _ = service
                .login(login("ana@example.com", "wrong password"), client())
                .await;
        }

        assert!(service
            .login(login("ana@example.com", "correct horse"), client())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_lockout_window_ignores_old_failures() {
        let policy = LockoutPolicy::default().window(Duration::from_secs(15 * 60));
        let (store, service) = service_with(policy);
        active_user(&service, "ana@example.com", "12345678").await;

        for _ in 0..4 {
            let _ = service
                .login(login("ana@example.com", "wrong password"), client())
                .await;
        }
        store.age_attempts("ana@example.com", chrono::Duration::hours(1));

        let _ = service
            .login(login("ana@example.com", "wrong password"), client())
            .await;
        assert!(service
            .login(login("ana@example.com", "correct horse"), client())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_unblock_restores_login() {
        let (_, service) = service_with(LockoutPolicy::new(1));
        let user = active_user(&service, "ana@example.com", "12345678").await;

        let _ = service
            .login(login("ana@example.com", "wrong password"), client())
            .await;
        assert!(matches!(
            service
                .login(login("ana@example.com", "correct horse"), client())
                .await,
            Err(AppError::InactiveAccount)
        ));

        service
            .set_user_status(user.id, UserStatus::Active)
            .await
            .unwrap();
        assert!(service
            .login(login("ana@example.com", "correct horse"), client())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_unblock_forgives_earlier_failures() {
        let (_, service) = service();
        let user = active_user(&service, "ana@example.com", "12345678").await;

        for _ in 0..5 {
            let _ = service
                .login(login("ana@example.com", "wrong password"), client())
                .await;
        }
        service
            .set_user_status(user.id, UserStatus::Active)
            .await
            .unwrap();

        let result = service
            .login(login("ana@example.com", "wrong password"), client())
            .await;
        assert!(matches!(result, Err(AppError::InvalidCredentials)));
        assert!(service
            .login(login("ana@example.com", "correct horse"), client())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_failures_accumulate_across_successes_when_configured() {
        let (_, service) = service_with(LockoutPolicy::new(3).reset_on_success(false));
        active_user(&service, "ana@example.com", "12345678").await;

        for _ in 0..2 {
            let _ = service
                .login(login("ana@example.com", "wrong password"), client())
                .await;
        }
        service
            .login(login("ana@example.com", "correct horse"), client())
            .await
            .unwrap();
        let _ = service
            .login(login("ana@example.com", "wrong password"), client())
            .await;

        assert!(matches!(
            service
                .login(login("ana@example.com", "correct horse"), client())
                .await,
            Err(AppError::InactiveAccount)
        ));
    }

    #[test]
    fn test_dummy_hash_is_usable() {
        assert_eq!(bcrypt::verify("correct horse", DUMMY_HASH).ok(), Some(false));
    }

    #[tokio::test]
    async fn test_current_user() {
        let (_, service) = service();
        let user = active_user(&service, "ana@example.com", "12345678").await;
        let ok = service
            .login(login("ana@example.com", "correct horse"), client())
            .await
            .unwrap();

        let me = service.current_user(Some(&ok.token)).await.unwrap();
        assert_eq!(me.id, user.id);

        assert!(matches!(
            service.current_user(None).await,
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            service.current_user(Some("garbage")).await,
            Err(AppError::InvalidToken)
        ));

        let stranger = service
            .tokens
            .issue_session(Uuid::new_v4(), UserRole::User)
            .unwrap();
        assert!(matches!(
            service.current_user(Some(&stranger)).await,
            Err(AppError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn test_verify_email_transitions() {
        let (_, service) = service();
        let reg = service
            .register(registration("ana@example.com", "12345678"))
            .await
            .unwrap();

        let user = service.verify_email(&reg.verification_token).await.unwrap();
        assert_eq!(user.status, UserStatus::Active);

        // idempotent
        let again = service.verify_email(&reg.verification_token).await.unwrap();
        assert_eq!(again.status, UserStatus::Active);

        service
            .set_user_status(user.id, UserStatus::Blocked)
            .await
            .unwrap();
        assert!(matches!(
            service.verify_email(&reg.verification_token).await,
            Err(AppError::InactiveAccount)
        ));

        let orphan = service.tokens.issue_verification("nobody@example.com").unwrap();
        assert!(matches!(
            service.verify_email(&orphan).await,
            Err(AppError::UserNotFound)
        ));
    }

    #[test]
    fn test_looks_like_email() {
        assert!(looks_like_email("ana@example.com"));
        assert!(!looks_like_email("ana@example"));
        assert!(!looks_like_email("@example.com"));
        assert!(!looks_like_email("ana example@x.com"));
        assert!(!looks_like_email("ana@.com"));
    }
}
