//! # SQLite Database methods
//!
//! This module contains "low-level" SQLite database interactions.
//!
//! All these interaction are maintained by simple functions (rather than stateful structs) that accept a
//! `&mut SqliteConnection` argument. Callers can obtain a connection from a pool,
//! or create an atomic transaction as the need arises and call through to the functions without any other changes.
//!
//! Writes that carry a `RETURNING` clause are read back with `fetch_all`, never `fetch_one`/`fetch_optional`, so that the
//! statement is always stepped to completion before the connection is handed back.
//!
//! Timestamps are always bound from Rust (never `CURRENT_TIMESTAMP`) so that every stored value has the same text
//! format and range queries compare correctly.
use std::env;

use log::info;
use sqlx::{sqlite::SqlitePoolOptions, Error as SqlxError, SqlitePool};

pub mod fulfillments;
pub mod history;
pub mod orders;
pub mod products;
pub mod reconciliation;
pub mod trackings;
pub mod wallet;

const SQLITE_DB_URL: &str = "sqlite://data/marketplace.db";

pub fn db_url() -> String {
    let result = env::var("MKP_DATABASE_URL").unwrap_or_else(|_| {
        info!("🗃️ MKP_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("🗃️ Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}
