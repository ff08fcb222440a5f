// src/bin/wiki.rs
use env_logger::{Builder, Env};
use ledger_wiki::config::WikiConfig;
use ledger_wiki::wiki::api;
use ledger_wiki::wiki::store::EntryStore;
use log::{error, info};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let config = match WikiConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return;
        }
    };

    let store = match EntryStore::open(&config.entries_dir).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Failed to open entries directory {:?}: {}", config.entries_dir, e);
            return;
        }
    };

    info!("Starting the wiki application...");
    info!("Server running on http://{}", config.addr);
    warp::serve(api::routes(store)).run(config.addr).await;
}
