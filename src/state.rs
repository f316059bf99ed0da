use std::sync::Arc;

use crate::config::{AppConfig, CookieConfig};
use crate::services::{AuthService, WalletService};
use crate::store::{UserStore, WalletStore};
use crate::utils::TokenKeys;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub wallets: Arc<WalletService>,
    pub cookie: CookieConfig,
}

impl AppState {
    /// Wire both services onto one backing store.
    pub fn new<S>(store: Arc<S>, config: &AppConfig) -> Self
    where
        S: UserStore + WalletStore + 'static,
    {
        let auth = AuthService::new(
            store.clone(),
            TokenKeys::new(&config.jwt_secret),
            config.lockout,
        );
        let wallets = WalletService::new(store, config.default_currency.clone());

        Self {
            auth: Arc::new(auth),
            wallets: Arc::new(wallets),
            cookie: config.cookie.clone(),
        }
    }
}
