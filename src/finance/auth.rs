// src/finance/auth.rs
//! Session tokens and password hashes.
//!
//! Sessions are HS256 JWTs carried in the `session` cookie. Each token names
//! the user's session version at issue time; bumping the version server-side
//! revokes it. Password hashes use the `pbkdf2:sha256:<iterations>$<salt>$<hex>`
//! layout so existing werkzeug hashes keep verifying.

use crate::finance::error::LedgerError;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::{debug, error};
use pbkdf2::pbkdf2_hmac;
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

pub const SESSION_COOKIE: &str = "session";
const SALT_LENGTH: usize = 8;
const HASH_METHOD: &str = "pbkdf2:sha256";

#[derive(Serialize, Deserialize)]
struct Claims {
    sub: String,
    ver: i64,
    exp: usize,
}

/// What a verified token asserts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Session {
    pub user_id: i64,
    pub version: i64,
}

#[derive(Clone)]
pub struct SessionKeys {
    secret: String,
    ttl: Duration,
}

impl SessionKeys {
    pub fn new(secret: impl Into<String>, ttl_hours: i64) -> Self {
        SessionKeys {
            secret: secret.into(),
            ttl: Duration::hours(ttl_hours),
        }
    }

    pub fn create_token(&self, session: Session) -> Result<String, LedgerError> {
        let claims = Claims {
            sub: session.user_id.to_string(),
            ver: session.version,
            exp: (Utc::now() + self.ttl).timestamp().max(0) as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?;
        Ok(token)
    }

    /// Checks signature and expiry only; the caller compares the version
    /// against the stored one.
    pub fn verify_token(&self, token: &str) -> Option<Session> {
        match decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        ) {
            Ok(data) => Some(Session {
                user_id: data.claims.sub.parse().ok()?,
                version: data.claims.ver,
            }),
            Err(e) => {
                debug!("Rejected session token: {}", e);
                None
            }
        }
    }

    pub fn session_cookie(&self, token: &str) -> String {
        format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax")
    }
}

pub fn clear_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// `generate_password_hash` off the async workers.
pub async fn hash_password(password: String, iterations: u32) -> Result<String, LedgerError> {
    tokio::task::spawn_blocking(move || generate_password_hash(&password, iterations))
        .await
        .map_err(|e| LedgerError::Hash(e.to_string()))?
}

/// `check_password_hash` off the async workers.
pub async fn verify_password(stored: String, password: String) -> bool {
    match tokio::task::spawn_blocking(move || check_password_hash(&stored, &password)).await {
        Ok(valid) => valid,
        Err(e) => {
            error!("Password check did not complete: {}", e);
            false
        }
    }
}

pub fn generate_password_hash(password: &str, iterations: u32) -> Result<String, LedgerError> {
    let salt: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SALT_LENGTH)
        .map(char::from)
        .collect();
    let digest = pbkdf2_sha256(password.as_bytes(), salt.as_bytes(), iterations)?;
    Ok(format!("{HASH_METHOD}:{iterations}${salt}${}", hex::encode(digest)))
}

/// Malformed stored hashes never verify.
pub fn check_password_hash(stored: &str, password: &str) -> bool {
    let mut parts = stored.splitn(3, '$');
    let (Some(method), Some(salt), Some(expected)) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    let Some(iterations) = method
        .strip_prefix(HASH_METHOD)
        .and_then(|rest| rest.strip_prefix(':'))
        .and_then(|count| count.parse::<u32>().ok())
    else {
        return false;
    };
    let Ok(expected) = hex::decode(expected) else {
        return false;
    };

    match pbkdf2_sha256(password.as_bytes(), salt.as_bytes(), iterations) {
        Ok(digest) => bool::from(digest[..].ct_eq(&expected[..])),
        Err(_) => false,
    }
}

fn pbkdf2_sha256(password: &[u8], salt: &[u8], iterations: u32) -> Result<[u8; 32], LedgerError> {
    if iterations == 0 {
        return Err(LedgerError::Hash("iteration count must be positive".to_string()));
    }
    let mut digest = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut digest);
    Ok(digest)
}
