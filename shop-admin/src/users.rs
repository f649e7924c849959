//! Shop customers. Managed by admins; customers never sign in through this service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::accounts::is_valid_email;
use crate::db::RecordError;
use crate::password::MAX_PASSWORD_BYTES;

const USER_NOT_FOUND: &str = "User not found";

const NAME_CHARS: std::ops::RangeInclusive<usize> = 3..=20;
const AGE_YEARS: std::ops::RangeInclusive<i64> = 18..=60;
const MIN_PASSWORD_CHARS: usize = 8;

const CREATE_USER_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        first_name TEXT NOT NULL,
        last_name TEXT NOT NULL,
        middle_name TEXT NOT NULL DEFAULT '',
        email TEXT NOT NULL,
        age INTEGER,
        phone TEXT NOT NULL DEFAULT '',
        image TEXT NOT NULL DEFAULT '',
        password TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )";

const USER_COLUMNS: &str =
    "id, first_name, last_name, middle_name, email, age, phone, image, created_at";

/// A stored customer. The password hash is never selected into this type.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub middle_name: String,
    pub email: String,
    pub age: Option<i64>,
    pub phone: String,
    pub image: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserForm {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub middle_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub age: Option<i64>,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub password: String,
}

/// Whether an empty password is a validation failure or means "leave unchanged".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordRule {
    Required,
    Optional,
}

/// Reports the first failing field, in declaration order.
pub fn validate_user_form(form: &UserForm, rule: PasswordRule) -> Result<(), String> {
    check_name("first_name", &form.first_name)?;
    check_name("last_name", &form.last_name)?;

    if form.email.trim().is_empty() {
        return Err(String::from("email is required"));
    }
    if !is_valid_email(form.email.trim()) {
        return Err(String::from("email must be a valid email address"));
    }

    if let Some(age) = form.age {
        if !AGE_YEARS.contains(&age) {
            return Err(format!(
                "age must be between {} and {}",
                AGE_YEARS.start(),
                AGE_YEARS.end()
            ));
        }
    }

    if form.password.is_empty() {
        return match rule {
            PasswordRule::Required => Err(String::from("password is required")),
            PasswordRule::Optional => Ok(()),
        };
    }
    if form.password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(format!(
            "password must be at least {MIN_PASSWORD_CHARS} characters"
        ));
    }
    if form.password.len() > MAX_PASSWORD_BYTES {
        return Err(format!(
            "password must be at most {MAX_PASSWORD_BYTES} bytes"
        ));
    }
    Ok(())
}

fn check_name(field: &str, value: &str) -> Result<(), String> {
    let length = value.trim().chars().count();
    if length == 0 {
        return Err(format!("{field} is required"));
    }
    if !NAME_CHARS.contains(&length) {
        return Err(format!(
            "{field} must be between {} and {} characters",
            NAME_CHARS.start(),
            NAME_CHARS.end()
        ));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_table(&self) -> Result<(), RecordError> {
        sqlx::query(CREATE_USER_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn list(&self, limit: u32, page: u32) -> Result<(Vec<User>, i64), RecordError> {
        let offset = i64::from(page.saturating_sub(1)) * i64::from(limit);
        let mut tx = self.pool.begin().await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&mut *tx)
            .await?;
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY id LIMIT ? OFFSET ?"
        ))
        .bind(i64::from(limit))
        .bind(offset)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((users, total))
    }

    pub async fn find(&self, id: i64) -> Result<User, RecordError> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RecordError::NotFound(USER_NOT_FOUND))
    }

    pub async fn insert(&self, form: &UserForm, password_hash: &str) -> Result<User, RecordError> {
        Ok(sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users
                 (first_name, last_name, middle_name, email, age, phone, image, password, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(form.first_name.trim())
        .bind(form.last_name.trim())
        .bind(form.middle_name.trim())
        .bind(form.email.trim())
        .bind(form.age)
        .bind(form.phone.trim())
        .bind(form.image.trim())
        .bind(password_hash)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?)
    }

    /// Replaces the profile fields. The stored hash changes only when `password_hash` is given.
    pub async fn update(
        &self,
        id: i64,
        form: &UserForm,
        password_hash: Option<&str>,
    ) -> Result<User, RecordError> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users
             SET first_name = ?, last_name = ?, middle_name = ?, email = ?, age = ?,
                 phone = ?, image = ?, password = COALESCE(?, password)
             WHERE id = ?
             RETURNING {USER_COLUMNS}"
        ))
        .bind(form.first_name.trim())
        .bind(form.last_name.trim())
        .bind(form.middle_name.trim())
        .bind(form.email.trim())
        .bind(form.age)
        .bind(form.phone.trim())
        .bind(form.image.trim())
        .bind(password_hash)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RecordError::NotFound(USER_NOT_FOUND))
    }

    pub async fn delete(&self, id: i64) -> Result<(), RecordError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RecordError::NotFound(USER_NOT_FOUND));
        }
        Ok(())
    }

    #[cfg(test)]
    async fn password_hash(&self, id: i64) -> Result<String, RecordError> {
        sqlx::query_scalar("SELECT password FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RecordError::NotFound(USER_NOT_FOUND))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use anyhow::Result;

    use super::{validate_user_form, PasswordRule, UserForm, UserStore};
    use crate::db::testing::temp_pool;
    use crate::db::RecordError;

    fn form() -> UserForm {
        UserForm {
            first_name: String::from("Grace"),
            last_name: String::from("Hopper"),
            email: String::from("grace@x.com"),
            age: Some(40),
            password: String::from("cobol-1959"),
            ..UserForm::default()
        }
    }

    #[test]
    fn user_form_reports_first_failure() {
        let message = |f: UserForm, rule| validate_user_form(&f, rule).unwrap_err();

        assert_eq!(
            message(UserForm::default(), PasswordRule::Required),
            "first_name is required"
        );
        assert_eq!(
            message(
                UserForm {
                    first_name: String::from("Al"),
                    ..form()
                },
                PasswordRule::Required
            ),
            "first_name must be between 3 and 20 characters"
        );
        assert_eq!(
            message(
                UserForm {
                    last_name: "x".repeat(21),
                    ..form()
                },
                PasswordRule::Required
            ),
            "last_name must be between 3 and 20 characters"
        );
        assert_eq!(
            message(
                UserForm {
                    email: String::from("grace"),
                    ..form()
                },
                PasswordRule::Required
            ),
            "email must be a valid email address"
        );
        assert_eq!(
            message(
                UserForm {
                    age: Some(17),
                    ..form()
                },
                PasswordRule::Required
            ),
            "age must be between 18 and 60"
        );
        assert_eq!(
            message(
                UserForm {
                    password: String::from("short"),
                    ..form()
                },
                PasswordRule::Optional
            ),
            "password must be at least 8 characters"
        );
        assert!(validate_user_form(&form(), PasswordRule::Required).is_ok());
        assert!(validate_user_form(
            &UserForm {
                age: None,
                ..form()
            },
            PasswordRule::Required
        )
        .is_ok());
    }

    #[test]
    fn empty_password_is_only_allowed_when_optional() {
        let no_password = UserForm {
            password: String::new(),
            ..form()
        };
        assert_eq!(
            validate_user_form(&no_password, PasswordRule::Required).unwrap_err(),
            "password is required"
        );
        assert!(validate_user_form(&no_password, PasswordRule::Optional).is_ok());
    }

    #[tokio::test]
    async fn update_keeps_hash_unless_a_new_one_is_given() -> Result<()> {
        let (_dir, pool) = temp_pool().await?;
        let store = UserStore::new(pool);
        store.create_table().await?;
        let grace = store.insert(&form(), "hash-1").await?;

        let renamed = UserForm {
            first_name: String::from("Admiral"),
            ..form()
        };
        let updated = store.update(grace.id, &renamed, None).await?;
        assert_eq!(updated.first_name, "Admiral");
        assert_eq!(store.password_hash(grace.id).await?, "hash-1");

        store.update(grace.id, &renamed, Some("hash-2")).await?;
        assert_eq!(store.password_hash(grace.id).await?, "hash-2");

        let missing = store.update(grace.id + 1, &renamed, None).await;
        assert!(matches!(missing, Err(RecordError::NotFound("User not found"))));
        Ok(())
    }

    #[tokio::test]
    async fn delete_removes_the_row_once() -> Result<()> {
        let (_dir, pool) = temp_pool().await?;
        let store = UserStore::new(pool);
        store.create_table().await?;
        let grace = store.insert(&form(), "hash").await?;

        let (listed, total) = store.list(10, 1).await?;
        assert_eq!(total, 1);
        assert_eq!(listed[0].email, "grace@x.com");

        store.delete(grace.id).await?;
        assert!(matches!(store.find(grace.id).await, Err(RecordError::NotFound(_))));
        assert!(matches!(store.delete(grace.id).await, Err(RecordError::NotFound(_))));
        Ok(())
    }
}
