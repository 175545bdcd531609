use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// SQLite file inside the index directory.
pub const DB_FILE: &str = "chunks.sqlite3";

/// Opens (creating if needed) the database inside `index_dir`.
pub async fn connect(index_dir: &Path) -> Result<SqlitePool> {
    std::fs::create_dir_all(index_dir)
        .with_context(|| format!("Failed to create index directory {}", index_dir.display()))?;

    let db_path = index_dir.join(DB_FILE);
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    open(options).await
}

/// Opens an existing database without creating anything. Returns `None`
/// when the database file is absent.
pub async fn connect_existing(index_dir: &Path) -> Result<Option<SqlitePool>> {
    let db_path = index_dir.join(DB_FILE);
    if !db_path.is_file() {
        return Ok(None);
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(false)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    Ok(Some(open(options).await?))
}

async fn open(options: SqliteConnectOptions) -> Result<SqlitePool> {
    // Single sequential pass per invocation; one connection is enough.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    Ok(pool)
}
