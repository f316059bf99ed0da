pub mod auth;
pub mod user;
pub mod wallet;

pub use auth::{AttemptOutcome, AuthPayload, LockoutPolicy, LoginAttempt, NewLoginAttempt};
pub use user::{NewUser, PublicUser, User, UserProfileDto, UserRole, UserStatus};
pub use wallet::{
    NewEntry, PostedEntry, Reconciliation, Transaction, TransactionFilter, TransactionStatus,
    TransactionType, Wallet, WalletStatus,
};
