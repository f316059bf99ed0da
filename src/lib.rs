//! Municipal citizen portal backend: authentication and wallet ledger.

pub mod config;
pub mod controllers;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod utils;
