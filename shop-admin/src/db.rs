use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Failure of a plain one-table read or write. The message of `NotFound` is shown to callers.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("{0}")]
    NotFound(&'static str),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Opens a connection pool, creating the database file when it does not exist yet.
pub async fn connect(url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect_with(options)
        .await?;

    info!(url = %url, max_connections, "database pool ready");
    Ok(pool)
}
