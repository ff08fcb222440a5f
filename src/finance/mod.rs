//! Stock-trading simulator: accounts, quotes, and an append-only trade ledger.
pub mod api;
pub mod auth;
pub mod db;
pub mod error;
pub mod lookup;
pub mod models;
pub mod views;
