// src/config.rs
use log::{info, warn};
use rand::{distributions::Alphanumeric, Rng};
use std::{env, fmt::Display, net::SocketAddr, path::PathBuf, str::FromStr};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),
    #[error("invalid {key} value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct FinanceConfig {
    pub addr: SocketAddr,
    pub database_url: String,
    pub api_key: Option<String>,
    pub quote_api_url: String,
    pub quotes_file: Option<PathBuf>,
    pub session_secret: String,
    pub session_ttl_hours: i64,
    pub password_iterations: u32,
}

impl FinanceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let quotes_file = var("QUOTES_FILE").map(PathBuf::from);
        let api_key = var("API_KEY");
        // Quotes come either from the remote service or from a local fixture.
        if api_key.is_none() && quotes_file.is_none() {
            return Err(ConfigError::Missing("API_KEY"));
        }

        let session_secret = var("SESSION_SECRET").unwrap_or_else(|| {
            warn!("SESSION_SECRET not set, sessions will not survive a restart");
            random_secret()
        });

        Ok(Self {
            addr: try_load("FINANCE_ADDR", "127.0.0.1:5000")?,
            database_url: try_load("DATABASE_URL", "sqlite://finance.db")?,
            api_key,
            quote_api_url: try_load("QUOTE_API_URL", "https://cloud.iexapis.com/stable")?,
            quotes_file,
            session_secret,
            session_ttl_hours: try_load("SESSION_TTL_HOURS", "24")?,
            password_iterations: try_load("PASSWORD_ITERATIONS", "260000")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct WikiConfig {
    pub addr: SocketAddr,
    pub entries_dir: PathBuf,
}

impl WikiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            addr: try_load("WIKI_ADDR", "127.0.0.1:8000")?,
            entries_dir: try_load("ENTRIES_DIR", "entries")?,
        })
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let value = var(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
        value,
    })
}

fn random_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(48)
        .map(char::from)
        .collect()
}
