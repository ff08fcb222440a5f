// src/finance/db.rs
use crate::finance::error::LedgerError;
use crate::finance::models::{Holding, Quote, Transaction, User, DEFAULT_CASH};
use chrono::NaiveDateTime;
use log::info;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool};
use sqlx::{Executor, Sqlite};
use std::str::FromStr;

pub async fn init(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePool::connect_with(options).await?;
    create_schema(&pool).await?;

    info!("Successfully opened ledger database at {}.", database_url);
    Ok(pool)
}

/// Money columns hold decimal text (`Decimal::to_string`) and are only ever
/// computed on in Rust.
pub async fn create_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            hash TEXT NOT NULL,
            cash TEXT NOT NULL,
            session_version INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id),
            symbol TEXT NOT NULL,
            name TEXT NOT NULL,
            shares INTEGER NOT NULL,
            date TEXT NOT NULL,
            price TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_transactions_user_symbol ON transactions(user_id, symbol)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

const USER_COLUMNS: &str = "id, username, hash, cash, session_version";

pub async fn find_user_by_name(
    pool: &SqlitePool,
    username: &str,
) -> Result<Option<User>, LedgerError> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE username = ?"
    ))
    .bind(username)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

pub async fn get_user(pool: &SqlitePool, user_id: i64) -> Result<User, LedgerError> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(LedgerError::UnknownUser(user_id))
}

/// Inserts a user with `DEFAULT_CASH` and returns its id.
pub async fn create_user(pool: &SqlitePool, username: &str, hash: &str) -> Result<i64, LedgerError> {
    let result = sqlx::query("INSERT INTO users (username, hash, cash) VALUES (?, ?, ?)")
        .bind(username)
        .bind(hash)
        .bind(DEFAULT_CASH.to_string())
        .execute(pool)
        .await;

    match result {
        Ok(done) => Ok(done.last_insert_rowid()),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(LedgerError::DuplicateUser),
        Err(e) => Err(e.into()),
    }
}

/// Replaces the password hash and ends every session issued before it.
pub async fn update_hash(pool: &SqlitePool, user_id: i64, hash: &str) -> Result<(), LedgerError> {
    let done = sqlx::query(
        "UPDATE users SET hash = ?, session_version = session_version + 1 WHERE id = ?",
    )
    .bind(hash)
    .bind(user_id)
    .execute(pool)
    .await?;
    if done.rows_affected() == 0 {
        return Err(LedgerError::UnknownUser(user_id));
    }
    Ok(())
}

/// Invalidates every session token issued to the user so far.
pub async fn end_sessions(pool: &SqlitePool, user_id: i64) -> Result<(), LedgerError> {
    let done = sqlx::query("UPDATE users SET session_version = session_version + 1 WHERE id = ?")
        .bind(user_id)
        .execute(pool)
        .await?;
    if done.rows_affected() == 0 {
        return Err(LedgerError::UnknownUser(user_id));
    }
    Ok(())
}

pub async fn add_cash(pool: &SqlitePool, user_id: i64, amount: Decimal) -> Result<(), LedgerError> {
    let mut tx = pool.begin().await?;
    let cash = lock_balance(&mut *tx, user_id).await?;
    let cash = cash.checked_add(amount).ok_or(LedgerError::AmountTooLarge)?;
    set_cash(&mut *tx, user_id, cash).await?;
    tx.commit().await?;
    Ok(())
}

/// Records a purchase and debits its cost, provided the user can afford it.
pub async fn buy(
    pool: &SqlitePool,
    user_id: i64,
    quote: &Quote,
    shares: i64,
    at: NaiveDateTime,
) -> Result<(), LedgerError> {
    // A cost too large to represent is more than any balance.
    let cost = quote.cost(shares).ok_or(LedgerError::InsufficientFunds)?;
    let mut tx = pool.begin().await?;

    let cash = lock_balance(&mut *tx, user_id).await?;
    if cash < cost {
        return Err(LedgerError::InsufficientFunds);
    }

    record(&mut *tx, user_id, quote, shares, at).await?;
    set_cash(&mut *tx, user_id, cash - cost).await?;

    tx.commit().await?;
    Ok(())
}

/// Records a sale and credits its proceeds, provided the user holds enough.
pub async fn sell(
    pool: &SqlitePool,
    user_id: i64,
    quote: &Quote,
    shares: i64,
    at: NaiveDateTime,
) -> Result<(), LedgerError> {
    let mut tx = pool.begin().await?;

    let cash = lock_balance(&mut *tx, user_id).await?;
    let held = net_shares(&mut *tx, user_id, &quote.symbol).await?;
    if shares > held {
        return Err(LedgerError::InsufficientShares);
    }
    let cash = quote
        .cost(shares)
        .and_then(|proceeds| cash.checked_add(proceeds))
        .ok_or(LedgerError::AmountTooLarge)?;

    record(&mut *tx, user_id, quote, -shares, at).await?;
    set_cash(&mut *tx, user_id, cash).await?;

    tx.commit().await?;
    Ok(())
}

/// Reads the balance with a write, so the transaction holds SQLite's write
/// lock before any check is made on it.
async fn lock_balance(conn: &mut SqliteConnection, user_id: i64) -> Result<Decimal, LedgerError> {
    let raw: String = sqlx::query_scalar("UPDATE users SET cash = cash WHERE id = ? RETURNING cash")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(LedgerError::UnknownUser(user_id))?;
    Decimal::from_str(&raw).map_err(|e| {
        LedgerError::Database(sqlx::Error::ColumnDecode {
            index: "cash".to_string(),
            source: Box::new(e),
        })
    })
}

async fn set_cash(conn: &mut SqliteConnection, user_id: i64, cash: Decimal) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET cash = ? WHERE id = ?")
        .bind(cash.to_string())
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn record<'e, E>(
    executor: E,
    user_id: i64,
    quote: &Quote,
    shares: i64,
    at: NaiveDateTime,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO transactions (user_id, symbol, name, shares, date, price) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(&quote.symbol)
    .bind(&quote.name)
    .bind(shares)
    .bind(at)
    .bind(quote.price.to_string())
    .execute(executor)
    .await?;
    Ok(())
}

/// Sum of signed shares for one symbol; zero when the user never traded it.
pub async fn net_shares<'e, E>(executor: E, user_id: i64, symbol: &str) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar(
        "SELECT COALESCE(SUM(shares), 0) FROM transactions WHERE user_id = ? AND symbol = ?",
    )
    .bind(user_id)
    .bind(symbol)
    .fetch_one(executor)
    .await
}

/// Symbols with a positive net holding, alphabetically.
pub async fn holdings(pool: &SqlitePool, user_id: i64) -> Result<Vec<Holding>, LedgerError> {
    let holdings = sqlx::query_as::<_, Holding>(
        r#"
        SELECT t.symbol AS symbol,
               MAX(t.name) AS name,
               SUM(t.shares) AS shares,
               (SELECT p.price FROM transactions p
                 WHERE p.user_id = t.user_id AND p.symbol = t.symbol
                 ORDER BY p.id DESC LIMIT 1) AS last_price
          FROM transactions t
         WHERE t.user_id = ?
         GROUP BY t.symbol
        HAVING SUM(t.shares) > 0
         ORDER BY t.symbol
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(holdings)
}

/// Every ledger row for the user, in insertion order.
pub async fn history(pool: &SqlitePool, user_id: i64) -> Result<Vec<Transaction>, LedgerError> {
    let rows = sqlx::query_as::<_, Transaction>(
        "SELECT id, user_id, symbol, name, shares, price, date FROM transactions WHERE user_id = ? ORDER BY id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
