//! Persistence backends.
//!
//! [`PgStore`] is the production backend; [`MemoryStore`] backs tests and
//! local development. Both implement the same traits and apply the same
//! ledger and lockout rules from [`crate::models`].

mod memory;
mod postgres;
mod traits;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use traits::{UserStore, WalletStore};
