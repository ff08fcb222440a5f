// src/wiki/error.rs
use log::error;
use thiserror::Error;
use warp::reject::Reject;

#[derive(Debug, Error)]
pub enum WikiError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid title {0:?}")]
    InvalidTitle(String),
}

/// A request that could not be answered with a page.
#[derive(Debug)]
pub struct ServerError;

impl Reject for ServerError {}

impl WikiError {
    pub fn into_rejection(self) -> warp::Rejection {
        error!("Request failed: {}", self);
        warp::reject::custom(ServerError)
    }
}
