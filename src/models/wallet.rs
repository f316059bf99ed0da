use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Largest page size `get_transactions` hands out.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Amounts are stored as NUMERIC(14,2).
const AMOUNT_SCALE: u32 = 2;

/// Largest value NUMERIC(14,2) holds, for both amounts and balances.
/// 99_999_999_999_999 × 10^-2, spelled as raw parts because `Decimal::new` is not `const`.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0x107A_3FFF, 0x5AF3, 0, false, 2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "wallet_status", rename_all = "lowercase")]
pub enum WalletStatus {
    Active,
    Suspended,
    Closed,
}

impl WalletStatus {
    /// `active <-> suspended`, anything to `closed`; `closed` is terminal.
    pub fn can_transition_to(self, next: WalletStatus) -> bool {
        match (self, next) {
            (WalletStatus::Closed, _) => false,
            (a, b) if a == b => false,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "transaction_type", rename_all = "lowercase")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Payment,
    Refund,
}

impl TransactionType {
    #[inline]
    pub fn is_credit(self) -> bool {
        matches!(self, TransactionType::Deposit | TransactionType::Refund)
    }

    /// The entry type that cancels this one.
    pub fn inverse(self) -> Self {
        match self {
            TransactionType::Deposit => TransactionType::Withdrawal,
            TransactionType::Withdrawal => TransactionType::Deposit,
            TransactionType::Payment => TransactionType::Refund,
            TransactionType::Refund => TransactionType::Payment,
        }
    }

    #[inline]
    pub fn signed(self, amount: Decimal) -> Decimal {
        if self.is_credit() {
            amount
        } else {
            -amount
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "transaction_status", rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Reversed,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub balance: Decimal,
    pub currency: String,
    pub status: WalletStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn ensure_active(&self) -> AppResult<()> {
        if self.status == WalletStatus::Active {
            Ok(())
        } else {
            Err(AppError::WalletInactive)
        }
    }

    /// Balance after posting `entry`, or why it cannot be posted.
    pub fn balance_after(&self, entry: &NewEntry) -> AppResult<Decimal> {
        self.ensure_active()?;

        let next = self
            .balance
            .checked_add(entry.kind.signed(entry.amount))
            .filter(|next| *next <= MAX_AMOUNT)
            .ok_or_else(|| AppError::invalid("amount", "would exceed the maximum wallet balance"))?;
        if next < Decimal::ZERO {
            return Err(AppError::InsufficientFunds);
        }
        Ok(next)
    }
}

/// Ledger entry. Only `status` ever changes, and only `completed -> reversed`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Transaction {
    pub id: Uuid,
    pub wallet_id: Uuid,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: Decimal,
    pub description: String,
    pub status: TransactionStatus,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn ensure_reversible(&self) -> AppResult<()> {
        if self.status == TransactionStatus::Completed {
            Ok(())
        } else {
            Err(AppError::TransactionNotReversible)
        }
    }

    /// The offsetting entry for this transaction.
    pub fn reversal_entry(&self) -> NewEntry {
        NewEntry {
            kind: self.kind.inverse(),
            amount: self.amount,
            description: format!("Reversal of {}", self.id),
            metadata: Some(json!({ "reversal_of": self.id })),
        }
    }

    /// Whether this entry's effect is part of the balance.
    ///
    /// A reversed original still counts: its offsetting entry cancels it.
    #[inline]
    pub fn affects_balance(&self) -> bool {
        matches!(
            self.status,
            TransactionStatus::Completed | TransactionStatus::Reversed
        )
    }
}

#[derive(Debug, Clone)]
pub struct NewEntry {
    pub kind: TransactionType,
    pub amount: Decimal,
    pub description: String,
    pub metadata: Option<serde_json::Value>,
}

impl NewEntry {
    pub fn new(
        kind: TransactionType,
        amount: Decimal,
        description: impl Into<String>,
    ) -> AppResult<Self> {
        validate_amount(amount)?;
        Ok(Self {
            kind,
            amount,
            description: description.into(),
            metadata: None,
        })
    }

    pub fn with_metadata(mut self, metadata: Option<serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

pub fn validate_amount(amount: Decimal) -> AppResult<()> {
    if amount <= Decimal::ZERO {
        return Err(AppError::invalid("amount", "must be greater than zero"));
    }
    if amount.normalize().scale() > AMOUNT_SCALE {
        return Err(AppError::invalid("amount", "at most 2 decimal places"));
    }
    if amount > MAX_AMOUNT {
        return Err(AppError::invalid("amount", format!("must not exceed {MAX_AMOUNT}")));
    }
    Ok(())
}

pub fn normalize_currency(currency: &str) -> AppResult<String> {
    let code = currency.trim().to_ascii_uppercase();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code)
    } else {
        Err(AppError::invalid("currency", "must be a 3-letter currency code"))
    }
}

/// Net balance implied by a set of ledger entries.
pub fn ledger_balance<'a, I>(transactions: I) -> AppResult<Decimal>
where
    I: IntoIterator<Item = &'a Transaction>,
{
    transactions
        .into_iter()
        .filter(|tx| tx.affects_balance())
        .try_fold(Decimal::ZERO, |sum, tx| sum.checked_add(tx.kind.signed(tx.amount)))
        .ok_or_else(|| AppError::internal("ledger sum overflowed"))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionFilter {
    #[serde(rename = "type")]
    pub kind: Option<TransactionType>,
    pub status: Option<TransactionStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl TransactionFilter {
    pub fn matches(&self, tx: &Transaction) -> bool {
        self.kind.map_or(true, |k| tx.kind == k)
            && self.status.map_or(true, |s| tx.status == s)
            && self.from.map_or(true, |from| tx.created_at >= from)
            && self.to.map_or(true, |to| tx.created_at <= to)
    }

    /// `(limit, offset)` clamped to sane bounds.
    pub fn page(&self) -> (i64, i64) {
        let limit = self.limit.unwrap_or(MAX_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}

/// Stored balance vs. the sum of the ledger.
#[derive(Debug, Clone, Serialize)]
pub struct Reconciliation {
    pub wallet_id: Uuid,
    pub stored_balance: Decimal,
    pub ledger_balance: Decimal,
    pub consistent: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateWalletRequest {
    pub currency: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount: Decimal,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateWalletStatus {
    pub status: WalletStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostedEntry {
    pub wallet: Wallet,
    pub transaction: Transaction,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet(balance: Decimal, status: WalletStatus) -> Wallet {
        let now = Utc::now();
        Wallet {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            balance,
            currency: "USD".into(),
            status,
            created_at: now,
            updated_at: now,
        }
    }

    fn tx(kind: TransactionType, amount: i64, status: TransactionStatus) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            wallet_id: Uuid::nil(),
            kind,
            amount: Decimal::from(amount),
            description: String::new(),
            status,
            metadata: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_inverse_pairs() {
        for kind in [
            TransactionType::Deposit,
            TransactionType::Withdrawal,
            TransactionType::Payment,
            TransactionType::Refund,
        ] {
            assert_eq!(kind.inverse().inverse(), kind);
            assert_ne!(kind.is_credit(), kind.inverse().is_credit());
        }
    }

    #[test]
    fn test_amount_validation() {
        assert!(validate_amount(Decimal::new(50000, 2)).is_ok());
        assert!(validate_amount(Decimal::new(1, 2)).is_ok());
        assert!(validate_amount(Decimal::ZERO).is_err());
        assert!(validate_amount(Decimal::from(-5)).is_err());
        assert!(validate_amount(Decimal::new(1001, 3)).is_err());
        // trailing zeros beyond two places are fine
        assert!(validate_amount(Decimal::new(1000, 3)).is_ok());

        assert!(validate_amount(MAX_AMOUNT).is_ok());
        assert!(validate_amount(MAX_AMOUNT + Decimal::new(1, 2)).is_err());
        assert!(validate_amount(Decimal::MAX).is_err());
    }

    #[test]
    fn test_balance_after_caps_at_column_limit() {
        let w = wallet(MAX_AMOUNT - Decimal::ONE, WalletStatus::Active);
        let entry = NewEntry::new(TransactionType::Deposit, Decimal::from(2), "x").unwrap();
        assert!(matches!(w.balance_after(&entry), Err(AppError::Validation(_))));

        let entry = NewEntry::new(TransactionType::Deposit, Decimal::ONE, "x").unwrap();
        assert_eq!(w.balance_after(&entry).unwrap(), MAX_AMOUNT);
    }

    #[test]
    fn test_currency_normalization() {
        assert_eq!(normalize_currency(" pen ").unwrap(), "PEN");
        assert!(normalize_currency("EURO").is_err());
        assert!(normalize_currency("U$D").is_err());
    }

    #[test]
    fn test_balance_after_rejects_overdraft() {
        let w = wallet(Decimal::from(500), WalletStatus::Active);
        let entry = NewEntry::new(TransactionType::Withdrawal, Decimal::from(600), "x").unwrap();
        assert!(matches!(
            w.balance_after(&entry),
            Err(AppError::InsufficientFunds)
        ));

        let entry = NewEntry::new(TransactionType::Withdrawal, Decimal::from(500), "x").unwrap();
        assert_eq!(w.balance_after(&entry).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_balance_after_requires_active() {
        let entry = NewEntry::new(TransactionType::Deposit, Decimal::from(1), "x").unwrap();
        for status in [WalletStatus::Suspended, WalletStatus::Closed] {
            let w = wallet(Decimal::ZERO, status);
            assert!(matches!(
                w.balance_after(&entry),
                Err(AppError::WalletInactive)
            ));
        }
    }

    #[test]
    fn test_reversal_entry_shape() {
        let original = tx(TransactionType::Deposit, 500, TransactionStatus::Completed);
        let entry = original.reversal_entry();
        assert_eq!(entry.kind, TransactionType::Withdrawal);
        assert_eq!(entry.amount, original.amount);
        assert_eq!(
            entry.metadata.unwrap()["reversal_of"],
            json!(original.id.to_string())
        );
    }

    #[test]
    fn test_only_completed_is_reversible() {
        for status in [
            TransactionStatus::Pending,
            TransactionStatus::Failed,
            TransactionStatus::Reversed,
        ] {
            let t = tx(TransactionType::Deposit, 1, status);
            assert!(matches!(
                t.ensure_reversible(),
                Err(AppError::TransactionNotReversible)
            ));
        }
    }

    #[test]
    fn test_ledger_balance_with_reversal() {
        let entries = vec![
            tx(TransactionType::Deposit, 500, TransactionStatus::Reversed),
            tx(TransactionType::Withdrawal, 500, TransactionStatus::Completed),
            tx(TransactionType::Deposit, 200, TransactionStatus::Completed),
            tx(TransactionType::Payment, 50, TransactionStatus::Completed),
            tx(TransactionType::Refund, 20, TransactionStatus::Completed),
            tx(TransactionType::Deposit, 999, TransactionStatus::Failed),
            tx(TransactionType::Deposit, 999, TransactionStatus::Pending),
        ];
        assert_eq!(ledger_balance(&entries).unwrap(), Decimal::from(170));
    }

    #[test]
    fn test_wallet_status_transitions() {
        use WalletStatus::*;
        assert!(Active.can_transition_to(Suspended));
        assert!(Suspended.can_transition_to(Active));
        assert!(Active.can_transition_to(Closed));
        assert!(Suspended.can_transition_to(Closed));
        assert!(!Closed.can_transition_to(Active));
        assert!(!Active.can_transition_to(Active));
    }

    #[test]
    fn test_filter_page_is_clamped() {
        let filter = TransactionFilter {
            limit: Some(10_000),
            offset: Some(-3),
            ..Default::default()
        };
        assert_eq!(filter.page(), (MAX_PAGE_SIZE, 0));
        assert_eq!(TransactionFilter::default().page(), (MAX_PAGE_SIZE, 0));
    }

    #[test]
    fn test_filter_matches() {
        let t = tx(TransactionType::Payment, 10, TransactionStatus::Completed);
        let filter = TransactionFilter {
            kind: Some(TransactionType::Payment),
            status: Some(TransactionStatus::Completed),
            from: Some(t.created_at - chrono::Duration::seconds(1)),
            to: Some(t.created_at),
            ..Default::default()
        };
        assert!(filter.matches(&t));

        let filter = TransactionFilter {
            kind: Some(TransactionType::Deposit),
            ..Default::default()
        };
        assert!(!filter.matches(&t));
    }
}
