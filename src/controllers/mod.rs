pub mod admin_controller;
pub mod auth_controller;
pub mod wallet_controller;
