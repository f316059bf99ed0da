pub mod auth_service;
pub mod wallet_service;

pub use auth_service::{AuthService, ClientInfo, LoginSuccess, Registration};
pub use wallet_service::WalletService;
