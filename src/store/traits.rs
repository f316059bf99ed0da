//! Data-access traits.
//!
//! Stores own atomicity: every multi-step mutation runs as one unit with
//! the affected user or wallet row locked. The business rules themselves
//! come from `crate::models` so all stores agree on them.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    AttemptOutcome, LockoutPolicy, LoginAttempt, NewEntry, NewLoginAttempt, NewUser, PostedEntry,
    Transaction, TransactionFilter, User, UserStatus, Wallet, WalletStatus,
};

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>>;

    async fn find_user_by_id(&self, id: Uuid) -> AppResult<Option<User>>;

    /// Fails with `EmailExists` / `DniExists` when either is already taken.
    async fn insert_user(&self, user: NewUser) -> AppResult<User>;

    /// Overwrite a user's status. A `blocked -> active` change stamps
    /// `lockout_reset_at`. Returns `UserNotFound` for unknown ids.
    async fn set_user_status(&self, id: Uuid, status: UserStatus) -> AppResult<User>;

    /// Append a login attempt and apply the lockout policy.
    ///
    /// For a failure tied to a user id, the insert, the failure count and
    /// the `active -> blocked` transition happen atomically.
    async fn record_login_attempt(
        &self,
        attempt: NewLoginAttempt,
        policy: &LockoutPolicy,
    ) -> AppResult<AttemptOutcome>;

    async fn login_attempts_for_email(&self, email: &str) -> AppResult<Vec<LoginAttempt>>;
}

#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Create an active, zero-balance wallet.
    ///
    /// Fails with `WalletExists` if the user already has a non-closed wallet.
    async fn create_wallet(&self, user_id: Uuid, currency: &str) -> AppResult<Wallet>;

    async fn find_wallet(&self, id: Uuid) -> AppResult<Option<Wallet>>;

    async fn find_wallet_by_user(&self, user_id: Uuid) -> AppResult<Option<Wallet>>;

    async fn set_wallet_status(&self, id: Uuid, status: WalletStatus) -> AppResult<Wallet>;

    /// Insert a completed entry and move the balance, atomically.
    async fn post_entry(&self, wallet_id: Uuid, entry: NewEntry) -> AppResult<PostedEntry>;

    /// Insert the offsetting entry, move the balance and mark the original
    /// `reversed`, atomically.
    async fn reverse_transaction(&self, transaction_id: Uuid) -> AppResult<PostedEntry>;

    async fn find_transaction(&self, id: Uuid) -> AppResult<Option<Transaction>>;

    async fn list_transactions(
        &self,
        wallet_id: Uuid,
        filter: &TransactionFilter,
    ) -> AppResult<Vec<Transaction>>;

    /// The wallet and every one of its entries, read as one consistent snapshot.
    async fn ledger_snapshot(
        &self,
        wallet_id: Uuid,
    ) -> AppResult<Option<(Wallet, Vec<Transaction>)>>;
}
