use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::wallet::{ledger_balance, normalize_currency};
use crate::models::{
    NewEntry, PostedEntry, Reconciliation, Transaction, TransactionFilter, TransactionType, Wallet,
    WalletStatus,
};
use crate::store::WalletStore;

/// Per-user wallets over an append-only ledger.
pub struct WalletService {
    wallets: Arc<dyn WalletStore>,
    default_currency: String,
}

impl WalletService {
    pub fn new(wallets: Arc<dyn WalletStore>, default_currency: impl Into<String>) -> Self {
        Self {
            wallets,
            default_currency: default_currency.into(),
        }
    }

    pub async fn create_wallet(&self, user_id: Uuid, currency: Option<&str>) -> AppResult<Wallet> {
        let currency = normalize_currency(currency.unwrap_or(&self.default_currency))?;
        let wallet = self.wallets.create_wallet(user_id, &currency).await?;
        info!(wallet_id = %wallet.id, user_id = %user_id, %currency, "wallet created");
        Ok(wallet)
    }

    /// The user's open wallet, created on first access.
    pub async fn get_or_create_wallet(&self, user_id: Uuid) -> AppResult<Wallet> {
        if let Some(wallet) = self.wallets.find_wallet_by_user(user_id).await? {
            return Ok(wallet);
        }

        match self.create_wallet(user_id, None).await {
            Ok(wallet) => Ok(wallet),
            // lost a creation race
            Err(AppError::WalletExists) => self
                .wallets
                .find_wallet_by_user(user_id)
                .await?
                .ok_or(AppError::WalletNotFound),
            Err(e) => Err(e),
        }
    }

    pub async fn get_wallet(&self, wallet_id: Uuid) -> AppResult<Wallet> {
        self.wallets
            .find_wallet(wallet_id)
            .await?
            .ok_or(AppError::WalletNotFound)
    }

    pub async fn deposit(
        &self,
        wallet_id: Uuid,
        amount: Decimal,
        description: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> AppResult<PostedEntry> {
        self.post(wallet_id, TransactionType::Deposit, amount, description, metadata)
            .await
    }

    pub async fn withdraw(
        &self,
        wallet_id: Uuid,
        amount: Decimal,
        description: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> AppResult<PostedEntry> {
        self.post(wallet_id, TransactionType::Withdrawal, amount, description, metadata)
            .await
    }

    pub async fn pay(
        &self,
        wallet_id: Uuid,
        amount: Decimal,
        description: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> AppResult<PostedEntry> {
        self.post(wallet_id, TransactionType::Payment, amount, description, metadata)
            .await
    }

    pub async fn refund(
        &self,
        wallet_id: Uuid,
        amount: Decimal,
        description: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> AppResult<PostedEntry> {
        self.post(wallet_id, TransactionType::Refund, amount, description, metadata)
            .await
    }

    async fn post(
        &self,
        wallet_id: Uuid,
        kind: TransactionType,
        amount: Decimal,
        description: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> AppResult<PostedEntry> {
        let description = description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| default_description(kind).to_string());
        let entry = NewEntry::new(kind, amount, description)?.with_metadata(metadata);

        let posted = self.wallets.post_entry(wallet_id, entry).await.map_err(|e| {
            if matches!(e, AppError::InsufficientFunds) {
                warn!(wallet_id = %wallet_id, kind = ?kind, %amount, "insufficient funds");
            }
            e
        })?;

        info!(
            wallet_id = %wallet_id,
            transaction_id = %posted.transaction.id,
            kind = ?kind,
            %amount,
            balance = %posted.wallet.balance,
            "ledger entry posted"
        );
        Ok(posted)
    }

    pub async fn get_transactions(
        &self,
        wallet_id: Uuid,
        filter: &TransactionFilter,
    ) -> AppResult<Vec<Transaction>> {
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from > to {
                return Err(AppError::invalid("from", "must not be after `to`"));
            }
        }
        self.get_wallet(wallet_id).await?;
        self.wallets.list_transactions(wallet_id, filter).await
    }

    pub async fn get_transaction(&self, transaction_id: Uuid) -> AppResult<Transaction> {
        self.wallets
            .find_transaction(transaction_id)
            .await?
            .ok_or(AppError::TransactionNotFound)
    }

    /// Cancel a completed entry with an offsetting one.
    pub async fn reverse_transaction(&self, transaction_id: Uuid) -> AppResult<PostedEntry> {
        let posted = self.wallets.reverse_transaction(transaction_id).await?;
        info!(
            original_id = %transaction_id,
            reversal_id = %posted.transaction.id,
            wallet_id = %posted.wallet.id,
            "transaction reversed"
        );
        Ok(posted)
    }

    /// Compare the stored balance with the sum of the ledger.
    pub async fn reconcile(&self, wallet_id: Uuid) -> AppResult<Reconciliation> {
        let (wallet, transactions) = self
            .wallets
            .ledger_snapshot(wallet_id)
            .await?
            .ok_or(AppError::WalletNotFound)?;
        let computed = ledger_balance(&transactions)?;

        let report = Reconciliation {
            wallet_id,
            stored_balance: wallet.balance,
            ledger_balance: computed,
            consistent: wallet.balance == computed,
        };
        if !report.consistent {
            warn!(
                wallet_id = %wallet_id,
                stored = %report.stored_balance,
                ledger = %report.ledger_balance,
                "wallet balance does not match ledger"
            );
        }
        Ok(report)
    }

    pub async fn set_wallet_status(&self, wallet_id: Uuid, status: WalletStatus) -> AppResult<Wallet> {
        let wallet = self.wallets.set_wallet_status(wallet_id, status).await?;
        info!(wallet_id = %wallet_id, status = ?status, "wallet status changed");
        Ok(wallet)
    }
}

fn default_description(kind: TransactionType) -> &'static str {
    match kind {
        TransactionType::Deposit => "Deposit",
        TransactionType::Withdrawal => "Withdrawal",
        TransactionType::Payment => "Payment",
        TransactionType::Refund => "Refund",
    }
}
