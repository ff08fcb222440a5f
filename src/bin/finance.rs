// src/bin/finance.rs
use env_logger::{Builder, Env};
use ledger_wiki::config::FinanceConfig;
use ledger_wiki::finance::api::{self, AppState};
use ledger_wiki::finance::auth::SessionKeys;
use ledger_wiki::finance::db;
use ledger_wiki::finance::lookup::QuoteService;
use log::{error, info};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let config = match FinanceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return;
        }
    };

    let pool = match db::init(&config.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            return;
        }
    };

    let quotes = match (&config.quotes_file, &config.api_key) {
        (Some(path), _) => match QuoteService::from_file(path).await {
            Ok(quotes) => quotes,
            Err(e) => {
                error!("Failed to load quotes from {:?}: {}", path, e);
                return;
            }
        },
        (None, Some(api_key)) => QuoteService::remote(&config.quote_api_url, api_key),
        (None, None) => {
            error!("API_KEY not set");
            return;
        }
    };

    let state = Arc::new(AppState {
        pool,
        quotes,
        sessions: SessionKeys::new(&config.session_secret, config.session_ttl_hours),
        password_iterations: config.password_iterations,
    });

    info!("Starting the finance application...");
    info!("Server running on http://{}", config.addr);
    warp::serve(api::routes(state)).run(config.addr).await;
}
