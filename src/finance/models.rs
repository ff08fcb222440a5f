// src/finance/models.rs
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use std::str::FromStr;

/// Opening balance of every new account, $10,000.00.
pub const DEFAULT_CASH: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 2);

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub hash: String,
    pub cash: Decimal,
    /// Bumped whenever every outstanding session of the user must end.
    pub session_version: i64,
}

/// One row of the append-only ledger. Positive shares are buys, negative sells.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: i64,
    pub user_id: i64,
    pub symbol: String,
    pub name: String,
    pub shares: i64,
    pub price: Decimal,
    pub date: NaiveDateTime,
}

/// Net position for one symbol, summed over the ledger.
#[derive(Debug, Clone)]
pub struct Holding {
    pub symbol: String,
    pub name: String,
    pub shares: i64,
    pub last_price: Decimal,
}

// Money is stored as decimal text; SQLite has no exact numeric type.
fn decimal(row: &SqliteRow, column: &str) -> Result<Decimal, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

impl<'r> FromRow<'r, SqliteRow> for User {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(User {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            hash: row.try_get("hash")?,
            cash: decimal(row, "cash")?,
            session_version: row.try_get("session_version")?,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for Transaction {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Transaction {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            symbol: row.try_get("symbol")?,
            name: row.try_get("name")?,
            shares: row.try_get("shares")?,
            price: decimal(row, "price")?,
            date: row.try_get("date")?,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for Holding {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Holding {
            symbol: row.try_get("symbol")?,
            name: row.try_get("name")?,
            shares: row.try_get("shares")?,
            last_price: decimal(row, "last_price")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub name: String,
    pub price: Decimal,
}

impl Quote {
    /// `None` when the product does not fit a `Decimal`.
    pub fn cost(&self, shares: i64) -> Option<Decimal> {
        self.price.checked_mul(Decimal::from(shares))
    }
}

#[derive(Debug, Clone)]
pub struct PortfolioRow {
    pub holding: Holding,
    pub price: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone)]
pub struct Portfolio {
    pub rows: Vec<PortfolioRow>,
    pub cash: Decimal,
    pub total: Decimal,
}

impl Portfolio {
    /// Values each holding at its current price, falling back to the last
    /// execution price when no quote is available.
    pub fn value(holdings: Vec<(Holding, Option<Quote>)>, cash: Decimal) -> Self {
        let rows: Vec<PortfolioRow> = holdings
            .into_iter()
            .map(|(holding, quote)| {
                let price = quote.map(|q| q.price).unwrap_or(holding.last_price);
                let total = price.saturating_mul(Decimal::from(holding.shares));
                PortfolioRow {
                    holding,
                    price,
                    total,
                }
            })
            .collect();
        let total = rows
            .iter()
            .fold(cash, |total, row| total.saturating_add(row.total));
        Portfolio { rows, cash, total }
    }
}
