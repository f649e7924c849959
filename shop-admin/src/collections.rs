//! Product collections, each owned by the admin who created it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::db::RecordError;

const CREATE_COLLECTION_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS collections (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        admin_id INTEGER NOT NULL REFERENCES admin(id) ON DELETE CASCADE,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Collection {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub admin_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CollectionForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

pub fn validate_collection_form(form: &CollectionForm) -> Result<(), String> {
    if form.name.trim().is_empty() {
        return Err(String::from("name is required"));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct CollectionStore {
    pool: SqlitePool,
}

impl CollectionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Needs the `admin` table to exist first.
    pub async fn create_table(&self) -> Result<(), RecordError> {
        sqlx::query(CREATE_COLLECTION_TABLE)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Counts and reads one page inside a single transaction so both see the same rows.
    pub async fn list(&self, limit: u32, page: u32) -> Result<(Vec<Collection>, i64), RecordError> {
        let offset = i64::from(page.saturating_sub(1)) * i64::from(limit);
        let mut tx = self.pool.begin().await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM collections")
            .fetch_one(&mut *tx)
            .await?;
        let collections = sqlx::query_as::<_, Collection>(
            "SELECT id, name, description, admin_id, created_at
             FROM collections ORDER BY id LIMIT ? OFFSET ?",
        )
        .bind(i64::from(limit))
        .bind(offset)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((collections, total))
    }

    /// Inserts a collection owned by `owner`. Fails with `NotFound` when no such admin exists.
    pub async fn insert(&self, form: &CollectionForm, owner: &str) -> Result<Collection, RecordError> {
        sqlx::query_as::<_, Collection>(
            "INSERT INTO collections (name, description, admin_id, created_at)
             SELECT ?, ?, id, ? FROM admin WHERE username = ?
             RETURNING id, name, description, admin_id, created_at",
        )
        .bind(form.name.trim())
        .bind(form.description.trim())
        .bind(Utc::now())
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RecordError::NotFound("Admin not found"))
    }
}
