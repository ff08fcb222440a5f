// src/finance/error.rs
use log::error;
use thiserror::Error;
use warp::http::StatusCode;
use warp::reject::{Reject, Rejection};

/// A rejected request, rendered as an apology page.
#[derive(Debug)]
pub struct Apology {
    pub status: StatusCode,
    pub message: String,
}

impl Apology {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Apology {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
    }
}

impl Reject for Apology {}

/// Raised by login-protected routes when no valid session is present.
#[derive(Debug)]
pub struct LoginRequired;

impl Reject for LoginRequired {}

pub fn apology(status: StatusCode, message: impl Into<String>) -> Rejection {
    warp::reject::custom(Apology::new(status, message))
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("not enough cash")]
    InsufficientFunds,
    #[error("not enough shares")]
    InsufficientShares,
    #[error("amount too large")]
    AmountTooLarge,
    #[error("user already exists")]
    DuplicateUser,
    #[error("user {0} not found")]
    UnknownUser(i64),
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("session token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

impl LedgerError {
    /// Maps expected business failures to a 400 apology; everything else is
    /// logged and hidden behind a generic 500.
    pub fn into_apology(self) -> Apology {
        match self {
            LedgerError::InsufficientFunds
            | LedgerError::InsufficientShares
            | LedgerError::AmountTooLarge
            | LedgerError::DuplicateUser => Apology::bad_request(self.to_string()),
            other => {
                error!("Request failed: {}", other);
                Apology::internal()
            }
        }
    }

    pub fn into_rejection(self) -> Rejection {
        warp::reject::custom(self.into_apology())
    }
}
