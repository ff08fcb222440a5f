//! Wiki-style encyclopedia backed by a directory of markdown files.
pub mod api;
pub mod error;
pub mod store;
pub mod views;
