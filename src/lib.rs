// src/lib.rs
pub mod config;
pub mod finance;
pub mod html;
pub mod wiki;
