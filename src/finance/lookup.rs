// src/finance/lookup.rs
use crate::finance::models::Quote;
use log::{error, info, warn};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IexQuote {
    company_name: String,
    latest_price: Decimal,
    symbol: String,
}

/// Price lookup collaborator. `lookup` yields `None` for unknown symbols and
/// for any upstream failure.
pub enum QuoteService {
    Remote {
        client: Client,
        base_url: String,
        api_key: String,
    },
    Fixed(HashMap<String, Quote>),
}

impl QuoteService {
    pub fn remote(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        QuoteService::Remote {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn fixed(quotes: impl IntoIterator<Item = Quote>) -> Self {
        QuoteService::Fixed(
            quotes
                .into_iter()
                .map(|mut quote| {
                    quote.symbol = normalize_symbol(&quote.symbol);
                    (quote.symbol.clone(), quote)
                })
                .collect(),
        )
    }

    /// Loads a JSON array of `{symbol, name, price}` objects.
    pub async fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let raw = tokio::fs::read_to_string(path).await?;
        let quotes: Vec<Quote> = serde_json::from_str(&raw)?;
        info!("Loaded {} fixed quotes from {:?}", quotes.len(), path);
        Ok(Self::fixed(quotes))
    }

    pub async fn lookup(&self, symbol: &str) -> Option<Quote> {
        let symbol = normalize_symbol(symbol);
        if symbol.is_empty() {
            return None;
        }

        match self {
            QuoteService::Fixed(quotes) => quotes.get(&symbol).cloned(),
            QuoteService::Remote {
                client,
                base_url,
                api_key,
            } => {
                let url = format!(
                    "{}/stock/{}/quote?token={}",
                    base_url,
                    utf8_percent_encode(&symbol, NON_ALPHANUMERIC),
                    api_key
                );

                let response = match client.get(&url).send().await {
                    Ok(response) => response,
                    Err(e) => {
                        error!("Quote request for {} failed: {}", symbol, e);
                        return None;
                    }
                };
                if !response.status().is_success() {
                    warn!("Quote lookup for {} returned HTTP {}", symbol, response.status());
                    return None;
                }

                match response.json::<IexQuote>().await {
                    Ok(quote) => Some(Quote {
                        symbol: quote.symbol,
                        name: quote.company_name,
                        price: quote.latest_price,
                    }),
                    Err(e) => {
                        error!("Failed to parse quote for {}: {}", symbol, e);
                        None
                    }
                }
            }
        }
    }
}

pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quotes() -> QuoteService {
        QuoteService::fixed(vec![Quote {
            symbol: "NFLX".to_string(),
            name: "Netflix, Inc.".to_string(),
            price: Decimal::new(48025, 2),
        }])
    }

    #[tokio::test]
    async fn test_fixed_lookup_is_case_insensitive() {
        let quote = quotes().lookup("  nflx ").await.unwrap();
        assert_eq!(quote.symbol, "NFLX");
        assert_eq!(quote.price.to_string(), "480.25");
    }

    #[tokio::test]
    async fn test_unknown_and_empty_symbols_fail() {
        assert!(quotes().lookup("ZZZZ").await.is_none());
        assert!(quotes().lookup("   ").await.is_none());
    }

    #[tokio::test]
    async fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quotes.json");
        tokio::fs::write(&path, r#"[{"symbol":"aapl","name":"Apple Inc.","price":190.5}]"#)
            .await
            .unwrap();

        let service = QuoteService::from_file(&path).await.unwrap();
        let quote = service.lookup("AAPL").await.unwrap();
        assert_eq!(quote.name, "Apple Inc.");
        assert_eq!(quote.price, Decimal::new(1905, 1));
    }

    #[tokio::test]
    async fn test_remote_failure_is_none() {
        // Nothing listens on port 9 locally; the request fails fast.
        let service = QuoteService::remote("http://127.0.0.1:9", "key");
        assert!(service.lookup("AAPL").await.is_none());
    }

    #[test]
    fn test_iex_payload_shape() {
        let quote: IexQuote = serde_json::from_str(
            r#"{"symbol":"AAPL","companyName":"Apple Inc.","latestPrice":0.1,"open":188.0}"#,
        )
        .unwrap();
        assert_eq!(quote.company_name, "Apple Inc.");
        // Float prices keep their shortest decimal form.
        assert_eq!(quote.latest_price.to_string(), "0.1");
    }
}
