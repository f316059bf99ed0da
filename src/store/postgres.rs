use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnection, PgPoolOptions};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::models::{
    AttemptOutcome, LockoutPolicy, LoginAttempt, NewEntry, NewLoginAttempt, NewUser, PostedEntry,
    Transaction, TransactionFilter, User, UserStatus, Wallet, WalletStatus,
};

use super::traits::{UserStore, WalletStore};

/// Postgres implementation of [`UserStore`] and [`WalletStore`].
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Open a connection pool using the configured limits.
    pub async fn connect(config: &AppConfig) -> AppResult<Self> {
        let url = config
            .database_url
            .as_deref()
            .ok_or_else(|| AppError::internal("DATABASE_URL is not configured"))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(url)
            .await?;

        Ok(Self { pool })
    }

    /// Apply embedded migrations.
    pub async fn migrate(&self) -> AppResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(AppError::internal)
    }

    /// Post `entry` to an already locked wallet.
    async fn post_locked(
        conn: &mut PgConnection,
        wallet: Wallet,
        entry: NewEntry,
    ) -> AppResult<PostedEntry> {
        let balance = wallet.balance_after(&entry)?;

        let transaction = sqlx::query_as::<_, Transaction>(
            r#"
            INSERT INTO transactions (id, wallet_id, kind, amount, description, status, metadata)
            VALUES ($1, $2, $3, $4, $5, 'completed', $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(wallet.id)
        .bind(entry.kind)
        .bind(entry.amount)
        .bind(entry.description)
        .bind(entry.metadata)
        .fetch_one(&mut *conn)
        .await?;

        let wallet = sqlx::query_as::<_, Wallet>(
            "UPDATE wallets SET balance = $1, updated_at = now() WHERE id = $2 RETURNING *",
        )
        .bind(balance)
        .bind(wallet.id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(PostedEntry {
            wallet,
            transaction,
        })
    }

    async fn lock_wallet(conn: &mut PgConnection, id: Uuid) -> AppResult<Wallet> {
        sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(conn)
            .await?
            .ok_or(AppError::WalletNotFound)
    }
}

/// Name of the violated constraint, if any.
fn violated_constraint(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) => db.constraint().map(str::to_owned),
        _ => None,
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn insert_user(&self, user: NewUser) -> AppResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, dni, password_hash, first_name, last_name, phone, role, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.email)
        .bind(&user.dni)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.phone)
        .bind(user.role)
        .bind(user.status)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match violated_constraint(&e).as_deref() {
            Some("users_email_key") => AppError::EmailExists,
            Some("users_dni_key") => AppError::DniExists,
            _ => e.into(),
        })
    }

    async fn set_user_status(&self, id: Uuid, status: UserStatus) -> AppResult<User> {
        // `status` on the right-hand side is the value before the update.
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET status = $1,
                lockout_reset_at = CASE
                    WHEN status = 'blocked' AND $1 = 'active' THEN $3
                    ELSE lockout_reset_at
                END,
                updated_at = $3
            WHERE id = $2
            RETURNING *
            "#,
        )
        .bind(status)
        .bind(id)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::UserNotFound)
    }

    async fn record_login_attempt(
        &self,
        attempt: NewLoginAttempt,
        policy: &LockoutPolicy,
    ) -> AppResult<AttemptOutcome> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let tracked_user = attempt.user_id.filter(|_| !attempt.success);

        // Lock the user first so concurrent failures serialize on the count.
        let locked = match tracked_user {
            Some(user_id) => {
                sqlx::query_as::<_, (UserStatus, Option<DateTime<Utc>>)>(
                    "SELECT status, lockout_reset_at FROM users WHERE id = $1 FOR UPDATE",
                )
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?
            }
            None => None,
        };

        sqlx::query(
            r#"
            INSERT INTO login_attempts (id, ip, email, success, user_id, user_agent, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&attempt.ip)
        .bind(&attempt.email)
        .bind(attempt.success)
        .bind(attempt.user_id)
        .bind(&attempt.user_agent)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let mut outcome = AttemptOutcome::Recorded;

        if let (Some(user_id), Some((UserStatus::Active, reset_at))) = (tracked_user, locked) {
            let last_success = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
                "SELECT max(created_at) FROM login_attempts WHERE user_id = $1 AND success",
            )
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

            let since = policy.count_since(now, last_success, reset_at);

            let failures = sqlx::query_scalar::<_, i64>(
                r#"
                SELECT count(*) FROM login_attempts
                WHERE user_id = $1 AND NOT success
                  AND ($2::timestamptz IS NULL OR created_at >= $2)
                "#,
            )
            .bind(user_id)
            .bind(since)
            .fetch_one(&mut *tx)
            .await?;

            if policy.should_block(failures.max(0) as u64) {
                sqlx::query(
                    "UPDATE users SET status = 'blocked', updated_at = now() WHERE id = $1",
                )
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
                outcome = AttemptOutcome::Locked;
            }
        }

        tx.commit().await?;
        Ok(outcome)
    }

    async fn login_attempts_for_email(&self, email: &str) -> AppResult<Vec<LoginAttempt>> {
        let attempts = sqlx::query_as::<_, LoginAttempt>(
            "SELECT * FROM login_attempts WHERE email = $1 ORDER BY created_at DESC",
        )
        .bind(email)
        .fetch_all(&self.pool)
        .await?;
        Ok(attempts)
    }
}

#[async_trait]
impl WalletStore for PgStore {
    async fn create_wallet(&self, user_id: Uuid, currency: &str) -> AppResult<Wallet> {
        sqlx::query_as::<_, Wallet>(
            r#"
            INSERT INTO wallets (id, user_id, balance, currency, status)
            VALUES ($1, $2, 0, $3, 'active')
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(currency)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match violated_constraint(&e).as_deref() {
            Some("wallets_one_open_per_user") => AppError::WalletExists,
            _ => e.into(),
        })
    }

    async fn find_wallet(&self, id: Uuid) -> AppResult<Option<Wallet>> {
        let wallet = sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(wallet)
    }

    async fn find_wallet_by_user(&self, user_id: Uuid) -> AppResult<Option<Wallet>> {
        let wallet = sqlx::query_as::<_, Wallet>(
            "SELECT * FROM wallets WHERE user_id = $1 AND status <> 'closed'",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(wallet)
    }

    async fn set_wallet_status(&self, id: Uuid, status: WalletStatus) -> AppResult<Wallet> {
        let mut tx = self.pool.begin().await?;
        let wallet = Self::lock_wallet(&mut tx, id).await?;

        if !wallet.status.can_transition_to(status) {
            return Err(AppError::invalid(
                "status",
                format!("cannot change wallet from {:?} to {:?}", wallet.status, status),
            ));
        }

        let wallet = sqlx::query_as::<_, Wallet>(
            "UPDATE wallets SET status = $1, updated_at = now() WHERE id = $2 RETURNING *",
        )
        .bind(status)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(wallet)
    }

    async fn post_entry(&self, wallet_id: Uuid, entry: NewEntry) -> AppResult<PostedEntry> {
        let mut tx = self.pool.begin().await?;
        let wallet = Self::lock_wallet(&mut tx, wallet_id).await?;
        let posted = Self::post_locked(&mut tx, wallet, entry).await?;
        tx.commit().await?;
        Ok(posted)
    }

    async fn reverse_transaction(&self, transaction_id: Uuid) -> AppResult<PostedEntry> {
        let mut tx = self.pool.begin().await?;

        let original = sqlx::query_as::<_, Transaction>(
            "SELECT * FROM transactions WHERE id = $1 FOR UPDATE",
        )
        .bind(transaction_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::TransactionNotFound)?;
        original.ensure_reversible()?;

        let wallet = Self::lock_wallet(&mut tx, original.wallet_id).await?;
        let posted = Self::post_locked(&mut tx, wallet, original.reversal_entry()).await?;

        sqlx::query("UPDATE transactions SET status = 'reversed' WHERE id = $1")
            .bind(original.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(posted)
    }

    async fn find_transaction(&self, id: Uuid) -> AppResult<Option<Transaction>> {
        let transaction = sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(transaction)
    }

    async fn list_transactions(
        &self,
        wallet_id: Uuid,
        filter: &TransactionFilter,
    ) -> AppResult<Vec<Transaction>> {
        let (limit, offset) = filter.page();
        let transactions = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT * FROM transactions
            WHERE wallet_id = $1
              AND ($2::transaction_type IS NULL OR kind = $2)
              AND ($3::transaction_status IS NULL OR status = $3)
              AND ($4::timestamptz IS NULL OR created_at >= $4)
              AND ($5::timestamptz IS NULL OR created_at <= $5)
            ORDER BY created_at DESC, id DESC
            LIMIT $6 OFFSET $7
            "#,
        )
        .bind(wallet_id)
        .bind(filter.kind)
        .bind(filter.status)
        .bind(filter.from)
        .bind(filter.to)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(transactions)
    }

    async fn ledger_snapshot(
        &self,
        wallet_id: Uuid,
    ) -> AppResult<Option<(Wallet, Vec<Transaction>)>> {
        let mut tx = self.pool.begin().await?;

        // FOR SHARE waits out any in-flight post and holds new ones off.
        let wallet = sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE id = $1 FOR SHARE")
            .bind(wallet_id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(wallet) = wallet else {
            return Ok(None);
        };

        let transactions = sqlx::query_as::<_, Transaction>(
            "SELECT * FROM transactions WHERE wallet_id = $1 ORDER BY created_at",
        )
        .bind(wallet_id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some((wallet, transactions)))
    }
}
