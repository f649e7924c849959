//! Admin credential persistence.
//!
//! Username and email are each unique. The uniqueness check and the insert share one
//! `BEGIN IMMEDIATE` transaction, so a second concurrent registration waits on the write
//! lock and then observes the first one's row. The `UNIQUE` constraints remain as a
//! backstop and their violations are reported as [`StoreError::Conflict`] too.

use chrono::{DateTime, Utc};
use sqlx::{Executor, Sqlite, SqlitePool};
use thiserror::Error;
use tracing::{debug, warn};

const CREATE_ADMIN_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS admin (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE,
        password TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("username or email already exists")]
    Conflict,
    #[error("admin not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AdminCredential {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[sqlx(rename = "password")]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CredentialStore {
    pool: SqlitePool,
}

impl CredentialStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_table(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_ADMIN_TABLE).execute(&self.pool).await?;
        debug!("admin table ready");
        Ok(())
    }

    pub async fn exists_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> Result<bool, StoreError> {
        exists_in(&self.pool, username, email).await
    }

    pub async fn insert(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<AdminCredential, StoreError> {
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        if exists_in(&mut *tx, username, email).await? {
            tx.rollback().await?;
            debug!(username = %username, "admin insert rejected: duplicate");
            return Err(StoreError::Conflict);
        }

        let inserted = sqlx::query_as::<_, AdminCredential>(
            "INSERT INTO admin (username, email, password, created_at)
             VALUES (?, ?, ?, ?)
             RETURNING id, username, email, password, created_at",
        )
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await;

        let record = match inserted {
            Ok(record) => record,
            Err(error) => {
                tx.rollback().await?;
                return Err(map_insert_error(error));
            }
        };

        tx.commit().await?;
        debug!(id = record.id, username = %record.username, "admin inserted");
        Ok(record)
    }

    pub async fn find_by_username(&self, username: &str) -> Result<AdminCredential, StoreError> {
        sqlx::query_as::<_, AdminCredential>(
            "SELECT id, username, email, password, created_at FROM admin WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM admin")
            .fetch_one(&self.pool)
            .await?)
    }
}

async fn exists_in<'e, E>(executor: E, username: &str, email: &str) -> Result<bool, StoreError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let found: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM admin WHERE username = ? OR email = ? LIMIT 1")
            .bind(username)
            .bind(email)
            .fetch_optional(executor)
            .await?;
    Ok(found.is_some())
}

fn map_insert_error(error: sqlx::Error) -> StoreError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict,
        _ => {
            warn!(error = %error, "admin insert failed");
            StoreError::Database(error)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use anyhow::Result;

    use super::{CredentialStore, StoreError};
    use crate::db::testing::temp_pool;

    #[tokio::test]
    async fn create_table_is_idempotent() -> Result<()> {
        let (_dir, pool) = temp_pool().await?;
        let store = CredentialStore::new(pool);

        store.create_table().await?;
        store.create_table().await?;
        assert_eq!(store.count().await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn insert_then_find_returns_stored_record() -> Result<()> {
        let (_dir, pool) = temp_pool().await?;
        let store = CredentialStore::new(pool);
        store.create_table().await?;

        let inserted = store.insert("alice", "a@x.com", "$2b$04$hash").await?;
        let found = store.find_by_username("alice").await?;

        assert_eq!(found.id, inserted.id);
        assert_eq!(found.username, "alice");
        assert_eq!(found.email, "a@x.com");
        assert_eq!(found.password_hash, "$2b$04$hash");
        assert_eq!(found.created_at.timestamp(), inserted.created_at.timestamp());
        Ok(())
    }

    #[tokio::test]
    async fn find_unknown_username_is_not_found() -> Result<()> {
        let (_dir, pool) = temp_pool().await?;
        let store = CredentialStore::new(pool);
        store.create_table().await?;

        let result = store.find_by_username("ghost").await;
        assert!(matches!(result, Err(StoreError::NotFound)));
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_username_or_email_conflicts() -> Result<()> {
        let (_dir, pool) = temp_pool().await?;
        let store = CredentialStore::new(pool);
        store.create_table().await?;
        store.insert("alice", "a@x.com", "h1").await?;

        let same_username = store.insert("alice", "other@x.com", "h2").await;
        assert!(matches!(same_username, Err(StoreError::Conflict)));

        let same_email = store.insert("bob", "a@x.com", "h3").await;
        assert!(matches!(same_email, Err(StoreError::Conflict)));

        assert_eq!(store.count().await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn exists_matches_either_field() -> Result<()> {
        let (_dir, pool) = temp_pool().await?;
        let store = CredentialStore::new(pool);
        store.create_table().await?;
        store.insert("alice", "a@x.com", "h1").await?;

        assert!(store.exists_by_username_or_email("alice", "n@x.com").await?);
        assert!(store.exists_by_username_or_email("nobody", "a@x.com").await?);
        assert!(!store.exists_by_username_or_email("nobody", "n@x.com").await?);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_inserts_with_same_username_yield_one_row() -> Result<()> {
        let (_dir, pool) = temp_pool().await?;
        let store = CredentialStore::new(pool);
        store.create_table().await?;

        let first = {
            let store = store.clone();
            tokio::spawn(async move { store.insert("racer", "r1@x.com", "h1").await })
        };
        let second = {
            let store = store.clone();
            tokio::spawn(async move { store.insert("racer", "r2@x.com", "h2").await })
        };

        let results = [first.await?, second.await?];
        let successes = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(StoreError::Conflict)))
            .count();

        assert_eq!(successes, 1);
        assert_eq!(conflicts, 1);
        assert_eq!(store.count().await?, 1);
        Ok(())
    }
}
