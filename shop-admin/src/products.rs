//! Product table. Plain reads and writes; access policy lives in the HTTP handlers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::db::RecordError;

const PRODUCT_NOT_FOUND: &str = "Product not found";

const CREATE_PRODUCT_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS products (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        price INTEGER NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        stock INTEGER NOT NULL DEFAULT 0,
        brand TEXT NOT NULL,
        created_by TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: i64,
    pub description: String,
    pub stock: i64,
    pub brand: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub brand: String,
}

pub fn validate_product_form(form: &ProductForm) -> Result<(), String> {
    if form.name.trim().is_empty() {
        return Err(String::from("name is required"));
    }
    if form.brand.trim().is_empty() {
        return Err(String::from("brand is required"));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ProductStore {
    pool: SqlitePool,
}

impl ProductStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_table(&self) -> Result<(), RecordError> {
        sqlx::query(CREATE_PRODUCT_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    /// One page of products (1-based `page`) plus the total row count.
    pub async fn list(&self, limit: u32, page: u32) -> Result<(Vec<Product>, i64), RecordError> {
        let offset = i64::from(page.saturating_sub(1)) * i64::from(limit);
        let mut tx = self.pool.begin().await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&mut *tx)
            .await?;
        let products = sqlx::query_as::<_, Product>(
            "SELECT id, name, price, description, stock, brand, created_by, created_at
             FROM products ORDER BY id LIMIT ? OFFSET ?",
        )
        .bind(i64::from(limit))
        .bind(offset)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((products, total))
    }

    pub async fn insert(&self, form: &ProductForm, created_by: &str) -> Result<Product, RecordError> {
        Ok(sqlx::query_as::<_, Product>(
            "INSERT INTO products (name, price, description, stock, brand, created_by, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING id, name, price, description, stock, brand, created_by, created_at",
        )
        .bind(form.name.trim())
        .bind(form.price)
        .bind(&form.description)
        .bind(form.stock)
        .bind(form.brand.trim())
        .bind(created_by)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?)
    }

    pub async fn find(&self, id: i64) -> Result<Product, RecordError> {
        sqlx::query_as::<_, Product>(
            "SELECT id, name, price, description, stock, brand, created_by, created_at
             FROM products WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RecordError::NotFound(PRODUCT_NOT_FOUND))
    }

    /// Replaces the editable fields. `created_by` and `created_at` are kept.
    pub async fn update(&self, id: i64, form: &ProductForm) -> Result<Product, RecordError> {
        sqlx::query_as::<_, Product>(
            "UPDATE products
             SET name = ?, price = ?, description = ?, stock = ?, brand = ?
             WHERE id = ?
             RETURNING id, name, price, description, stock, brand, created_by, created_at",
        )
        .bind(form.name.trim())
        .bind(form.price)
        .bind(&form.description)
        .bind(form.stock)
        .bind(form.brand.trim())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RecordError::NotFound(PRODUCT_NOT_FOUND))
    }

    pub async fn delete(&self, id: i64) -> Result<(), RecordError> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RecordError::NotFound(PRODUCT_NOT_FOUND));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use anyhow::Result;

    use super::{validate_product_form, ProductForm, ProductStore};
    use crate::db::testing::temp_pool;
    use crate::db::RecordError;

    fn form(name: &str, brand: &str) -> ProductForm {
        ProductForm {
            name: String::from(name),
            price: 1999,
            description: String::from("desc"),
            stock: 3,
            brand: String::from(brand),
        }
    }

    #[test]
    fn product_form_requires_name_then_brand() {
        assert_eq!(
            validate_product_form(&form("", "")).unwrap_err(),
            "name is required"
        );
        assert_eq!(
            validate_product_form(&form("Lamp", " ")).unwrap_err(),
            "brand is required"
        );
        assert!(validate_product_form(&form("Lamp", "Acme")).is_ok());
    }

    #[tokio::test]
    async fn list_pages_through_products() -> Result<()> {
        let (_dir, pool) = temp_pool().await?;
        let store = ProductStore::new(pool);
        store.create_table().await?;
        for name in ["a", "b", "c"] {
            store.insert(&form(name, "Acme"), "alice").await?;
        }

        let (first, total) = store.list(2, 1).await?;
        assert_eq!(total, 3);
        assert_eq!(
            first.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );

        let (second, _) = store.list(2, 2).await?;
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].name, "c");
        assert_eq!(second[0].created_by, "alice");

        let (beyond, _) = store.list(2, 5).await?;
        assert!(beyond.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn update_and_delete_touch_only_the_given_row() -> Result<()> {
        let (_dir, pool) = temp_pool().await?;
        let store = ProductStore::new(pool);
        store.create_table().await?;
        let lamp = store.insert(&form("Lamp", "Acme"), "alice").await?;
        let desk = store.insert(&form("Desk", "Acme"), "alice").await?;

        let renamed = store.update(lamp.id, &form(" Floor Lamp ", "Lumen")).await?;
        assert_eq!(renamed.name, "Floor Lamp");
        assert_eq!(renamed.brand, "Lumen");
        assert_eq!(renamed.created_by, "alice");
        assert_eq!(store.find(desk.id).await?.name, "Desk");

        store.delete(lamp.id).await?;
        assert!(matches!(
            store.find(lamp.id).await,
            Err(RecordError::NotFound("Product not found"))
        ));
        assert!(matches!(
            store.delete(lamp.id).await,
            Err(RecordError::NotFound(_))
        ));
        assert!(matches!(
            store.update(lamp.id, &form("Lamp", "Acme")).await,
            Err(RecordError::NotFound(_))
        ));

        let (_, total) = store.list(10, 1).await?;
        assert_eq!(total, 1);
        Ok(())
    }
}
