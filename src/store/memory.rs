use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    AttemptOutcome, LockoutPolicy, LoginAttempt, NewEntry, NewLoginAttempt, NewUser, PostedEntry,
    Transaction, TransactionFilter, TransactionStatus, User, UserStatus, Wallet, WalletStatus,
};

use super::traits::{UserStore, WalletStore};

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    attempts: Vec<LoginAttempt>,
    wallets: HashMap<Uuid, Wallet>,
    /// Insertion order, oldest first.
    transactions: Vec<Transaction>,
}

impl MemoryState {
    fn post(&mut self, wallet_id: Uuid, entry: NewEntry) -> AppResult<PostedEntry> {
        let wallet = self
            .wallets
            .get_mut(&wallet_id)
            .ok_or(AppError::WalletNotFound)?;
        let balance = wallet.balance_after(&entry)?;

        let now = Utc::now();
        wallet.balance = balance;
        wallet.updated_at = now;

        let transaction = Transaction {
            id: Uuid::new_v4(),
            wallet_id,
            kind: entry.kind,
            amount: entry.amount,
            description: entry.description,
            status: TransactionStatus::Completed,
            metadata: entry.metadata,
            created_at: now,
        };
        self.transactions.push(transaction.clone());

        Ok(PostedEntry {
            wallet: wallet.clone(),
            transaction,
        })
    }
}

/// Process-local implementation of [`UserStore`] and [`WalletStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shift every recorded attempt for `email` into the past.
    #[cfg(test)]
    pub(crate) fn age_attempts(&self, email: &str, by: chrono::Duration) {
        let mut state = self.state.lock();
        for attempt in state.attempts.iter_mut().filter(|a| a.email == email) {
            attempt.created_at -= by;
        }
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let state = self.state.lock();
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.state.lock().users.get(&id).cloned())
    }

    async fn insert_user(&self, user: NewUser) -> AppResult<User> {
        let mut state = self.state.lock();

        if state.users.values().any(|u| u.email == user.email) {
            return Err(AppError::EmailExists);
        }
        if state.users.values().any(|u| u.dni == user.dni) {
            return Err(AppError::DniExists);
        }

        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            email: user.email,
            dni: user.dni,
            password_hash: user.password_hash,
            first_name: user.first_name,
            last_name: user.last_name,
            phone: user.phone,
            role: user.role,
            status: user.status,
            lockout_reset_at: None,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn set_user_status(&self, id: Uuid, status: UserStatus) -> AppResult<User> {
        let mut state = self.state.lock();
        let user = state.users.get_mut(&id).ok_or(AppError::UserNotFound)?;
        let now = Utc::now();
        if user.status == UserStatus::Blocked && status == UserStatus::Active {
            user.lockout_reset_at = Some(now);
        }
        user.status = status;
        user.updated_at = now;
        Ok(user.clone())
    }

    async fn record_login_attempt(
        &self,
        attempt: NewLoginAttempt,
        policy: &LockoutPolicy,
    ) -> AppResult<AttemptOutcome> {
        let mut state = self.state.lock();
        let now = Utc::now();

        state.attempts.push(LoginAttempt {
            id: Uuid::new_v4(),
            ip: attempt.ip,
            email: attempt.email,
            success: attempt.success,
            user_id: attempt.user_id,
            user_agent: attempt.user_agent,
            created_at: now,
        });

        let Some(user_id) = attempt.user_id.filter(|_| !attempt.success) else {
            return Ok(AttemptOutcome::Recorded);
        };

        let last_success = state
            .attempts
            .iter()
            .filter(|a| a.user_id == Some(user_id) && a.success)
            .map(|a| a.created_at)
            .max();
        let reset_at = state.users.get(&user_id).and_then(|u| u.lockout_reset_at);
        let since = policy.count_since(now, last_success, reset_at);

        let failures = state
            .attempts
            .iter()
            .filter(|a| a.user_id == Some(user_id) && !a.success)
            .filter(|a| since.map_or(true, |s| a.created_at >= s))
            .count() as u64;

        if !policy.should_block(failures) {
            return Ok(AttemptOutcome::Recorded);
        }

        match state.users.get_mut(&user_id) {
            Some(user) if user.status == UserStatus::Active => {
                user.status = UserStatus::Blocked;
                user.updated_at = now;
                Ok(AttemptOutcome::Locked)
            }
            _ => Ok(AttemptOutcome::Recorded),
        }
    }

    async fn login_attempts_for_email(&self, email: &str) -> AppResult<Vec<LoginAttempt>> {
        let state = self.state.lock();
        Ok(state
            .attempts
            .iter()
            .rev()
            .filter(|a| a.email == email)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl WalletStore for MemoryStore {
    async fn create_wallet(&self, user_id: Uuid, currency: &str) -> AppResult<Wallet> {
        let mut state = self.state.lock();

        if state
            .wallets
            .values()
            .any(|w| w.user_id == user_id && w.status != WalletStatus::Closed)
        {
            return Err(AppError::WalletExists);
        }

        let now = Utc::now();
        let wallet = Wallet {
            id: Uuid::new_v4(),
            user_id,
            balance: Decimal::new(0, 2),
            currency: currency.to_string(),
            status: WalletStatus::Active,
            created_at: now,
            updated_at: now,
        };
        state.wallets.insert(wallet.id, wallet.clone());
        Ok(wallet)
    }

    async fn find_wallet(&self, id: Uuid) -> AppResult<Option<Wallet>> {
        Ok(self.state.lock().wallets.get(&id).cloned())
    }

    async fn find_wallet_by_user(&self, user_id: Uuid) -> AppResult<Option<Wallet>> {
        let state = self.state.lock();
        Ok(state
            .wallets
            .values()
            .find(|w| w.user_id == user_id && w.status != WalletStatus::Closed)
            .cloned())
    }

    async fn set_wallet_status(&self, id: Uuid, status: WalletStatus) -> AppResult<Wallet> {
        let mut state = self.state.lock();
        let wallet = state.wallets.get_mut(&id).ok_or(AppError::WalletNotFound)?;
        if !wallet.status.can_transition_to(status) {
            return Err(AppError::invalid(
                "status",
                format!("cannot change wallet from {:?} to {:?}", wallet.status, status),
            ));
        }
        wallet.status = status;
        wallet.updated_at = Utc::now();
        Ok(wallet.clone())
    }

    async fn post_entry(&self, wallet_id: Uuid, entry: NewEntry) -> AppResult<PostedEntry> {
        self.state.lock().post(wallet_id, entry)
    }

    async fn reverse_transaction(&self, transaction_id: Uuid) -> AppResult<PostedEntry> {
        let mut state = self.state.lock();

        let index = state
            .transactions
            .iter()
            .position(|tx| tx.id == transaction_id)
            .ok_or(AppError::TransactionNotFound)?;
        let original = &state.transactions[index];
        original.ensure_reversible()?;

        let wallet_id = original.wallet_id;
        let entry = original.reversal_entry();
        let posted = state.post(wallet_id, entry)?;

        state.transactions[index].status = TransactionStatus::Reversed;
        Ok(posted)
    }

    async fn find_transaction(&self, id: Uuid) -> AppResult<Option<Transaction>> {
        let state = self.state.lock();
        Ok(state.transactions.iter().find(|tx| tx.id == id).cloned())
    }

    async fn list_transactions(
        &self,
        wallet_id: Uuid,
        filter: &TransactionFilter,
    ) -> AppResult<Vec<Transaction>> {
        let (limit, offset) = filter.page();
        let state = self.state.lock();
        Ok(state
            .transactions
            .iter()
            .rev()
            .filter(|tx| tx.wallet_id == wallet_id && filter.matches(tx))
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn ledger_snapshot(
        &self,
        wallet_id: Uuid,
    ) -> AppResult<Option<(Wallet, Vec<Transaction>)>> {
        let state = self.state.lock();
        let Some(wallet) = state.wallets.get(&wallet_id).cloned() else {
            return Ok(None);
        };
        let transactions = state
            .transactions
            .iter()
            .filter(|tx| tx.wallet_id == wallet_id)
            .cloned()
            .collect();
        Ok(Some((wallet, transactions)))
    }
}
