//! SQLite-backed content cache for diff-derived AI output.
//!
//! Each purpose owns one table with a `(cache_key PRIMARY KEY, payload)` schema. Tables are
//! created on first touch, so a lookup against a brand new database is simply a miss.
//! A connection is opened for every operation and closed before it returns; nothing is held
//! across remote calls made by the caller.

use crate::config::RepoId;
use crate::error::CacheError;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection, Row};
use std::fmt;
use std::path::PathBuf;

/// What a cached payload was produced for. The same PR can be cached once per purpose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum CachePurpose {
    GenerateSummaries,
    CheckOpenPrReview,
}

impl CachePurpose {
    /// Table name, also used as the key's purpose tag.
    pub fn table(&self) -> &'static str {
        match self {
            CachePurpose::GenerateSummaries => "GENERATE_SUMMARIES",
            CachePurpose::CheckOpenPrReview => "CHECK_OPEN_PR_REVIEW",
        }
    }
}

impl fmt::Display for CachePurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

pub fn composite_key(repo: &RepoId, number: u64, purpose: CachePurpose) -> String {
    format!("{repo}#{number}:{purpose}")
}

#[derive(Clone, Debug)]
pub struct ContentCache {
    database: PathBuf,
}

impl ContentCache {
    pub fn new(database: impl Into<PathBuf>) -> Self {
        Self {
            database: database.into(),
        }
    }

    /// Exact-match lookup. A missing table is created and reported as a miss.
    pub async fn lookup(
        &self,
        purpose: CachePurpose,
        key: &str,
    ) -> Result<Option<String>, CacheError> {
        let mut conn = self.connect().await?;
        let result = select(&mut conn, purpose, key).await;
        let closed = conn.close().await;

        let payload = result?;
        closed?;

        tracing::debug!(table = purpose.table(), key, hit = payload.is_some(), "Cache lookup");
        Ok(payload)
    }

    /// Inserts a new entry. Storing a key twice fails with `CacheError::DuplicateKey`
    /// and leaves the first payload untouched.
    pub async fn store(
        &self,
        purpose: CachePurpose,
        key: &str,
        payload: &str,
    ) -> Result<(), CacheError> {
        let mut conn = self.connect().await?;
        let result = insert(&mut conn, purpose, key, payload).await;
        let closed = conn.close().await;

        result?;
        closed?;

        tracing::debug!(table = purpose.table(), key, "Cache store");
        Ok(())
    }

    async fn connect(&self) -> Result<SqliteConnection, CacheError> {
        let conn = SqliteConnectOptions::new()
            .filename(&self.database)
            .create_if_missing(true)
            .connect()
            .await?;
        Ok(conn)
    }
}

async fn ensure_table(
    conn: &mut SqliteConnection,
    purpose: CachePurpose,
) -> Result<(), CacheError> {
    let ddl = format!(
        "CREATE TABLE IF NOT EXISTS {} (cache_key TEXT PRIMARY KEY, payload TEXT NOT NULL)",
        purpose.table()
    );
    sqlx::query(&ddl).execute(&mut *conn).await?;
    Ok(())
}

async fn select(
    conn: &mut SqliteConnection,
    purpose: CachePurpose,
    key: &str,
) -> Result<Option<String>, CacheError> {
    ensure_table(conn, purpose).await?;

    let sql = format!("SELECT payload FROM {} WHERE cache_key = ?1", purpose.table());
    let row = sqlx::query(&sql)
        .bind(key)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => Ok(Some(row.try_get::<String, _>("payload")?)),
        None => Ok(None),
    }
}

async fn insert(
    conn: &mut SqliteConnection,
    purpose: CachePurpose,
    key: &str,
    payload: &str,
) -> Result<(), CacheError> {
    ensure_table(conn, purpose).await?;

    let sql = format!(
        "INSERT INTO {} (cache_key, payload) VALUES (?1, ?2)",
        purpose.table()
    );
    match sqlx::query(&sql)
        .bind(key)
        .bind(payload)
        .execute(&mut *conn)
        .await
    {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            Err(CacheError::DuplicateKey(key.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}
