//! Admin registration and sign-in.
//!
//! Both flows sit on top of [`CredentialStore`], [`PasswordHasher`] and [`TokenSigner`].
//! Sign-in never reveals whether the username or the password was wrong.

use std::sync::{Arc, LazyLock, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::password::{PasswordHasher, MAX_PASSWORD_BYTES};
use crate::store::{CredentialStore, StoreError};
use crate::token::{IssuedToken, TokenSigner};

pub const INVALID_CREDENTIALS: &str = "Invalid credentials";

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$")
        .unwrap_or_else(|e| panic!("email regex must be valid: {e}"))
});

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("{0}")]
    Validation(String),
    #[error("username or email already exists")]
    Conflict,
    #[error("Invalid credentials")]
    Unauthorized,
    #[error("storage failure: {0}")]
    Storage(#[source] StoreError),
    #[error("internal failure: {0}")]
    Internal(String),
}

impl From<StoreError> for AccountError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => AccountError::Conflict,
            other => AccountError::Storage(other),
        }
    }
}

/// Sign-up payload. Missing fields decode as empty and are caught by validation.
#[derive(Debug, Default, Deserialize)]
pub struct AdminForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Public view of an admin. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdminView {
    pub username: String,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct SignedIn {
    pub token: IssuedToken,
    pub admin: AdminView,
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Checks fields in declaration order and reports the first failure.
pub fn validate_admin_form(form: &AdminForm) -> Result<(), String> {
    if form.username.trim().is_empty() {
        return Err(String::from("username is required"));
    }
    if form.email.trim().is_empty() {
        return Err(String::from("email is required"));
    }
    if !is_valid_email(form.email.trim()) {
        return Err(String::from("email must be a valid email address"));
    }
    if form.password.is_empty() {
        return Err(String::from("password is required"));
    }
    if form.password.len() > MAX_PASSWORD_BYTES {
        return Err(format!(
            "password must be at most {MAX_PASSWORD_BYTES} bytes"
        ));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct Accounts {
    store: CredentialStore,
    hasher: PasswordHasher,
    tokens: Arc<TokenSigner>,
    decoy_hash: Arc<OnceLock<String>>,
}

impl Accounts {
    pub fn new(store: CredentialStore, hasher: PasswordHasher, tokens: Arc<TokenSigner>) -> Self {
        Self {
            store,
            hasher,
            tokens,
            decoy_hash: Arc::new(OnceLock::new()),
        }
    }

    pub fn tokens(&self) -> &TokenSigner {
        &self.tokens
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub async fn register(&self, form: AdminForm) -> Result<AdminView, AccountError> {
        validate_admin_form(&form).map_err(AccountError::Validation)?;

        let username = form.username.trim().to_string();
        let email = form.email.trim().to_string();

        // Cheap early exit before bcrypt; the insert repeats the check under a write lock.
        if self.store.exists_by_username_or_email(&username, &email).await? {
            debug!(username = %username, "registration conflict");
            return Err(AccountError::Conflict);
        }

        let password_hash = self
            .hasher
            .hash_blocking(form.password)
            .await
            .map_err(|e| AccountError::Internal(format!("password hashing: {e}")))?;

        let record = self
            .store
            .insert(&username, &email, &password_hash)
            .await
            .inspect_err(|e| {
                if matches!(e, StoreError::Conflict) {
                    debug!(username = %username, "registration conflict");
                }
            })?;

        info!(
            id = record.id,
            username = %record.username,
            created_at = %record.created_at,
            "admin registered"
        );
        Ok(AdminView {
            username: record.username,
            email: record.email,
        })
    }

    pub async fn sign_in(&self, creds: Credentials) -> Result<SignedIn, AccountError> {
        let username = creds.username.trim();
        let record = match self.store.find_by_username(username).await {
            Ok(record) => Some(record),
            Err(StoreError::NotFound) => None,
            Err(other) => return Err(AccountError::Storage(other)),
        };

        let verified = match &record {
            Some(record) => {
                self.hasher
                    .verify_blocking(creds.password, record.password_hash.clone())
                    .await
            }
            None => {
                // Spend the same bcrypt work as a real check, then fail.
                if let Some(decoy) = self.decoy_hash().await {
                    let _ = self.hasher.verify_blocking(creds.password, decoy).await;
                }
                false
            }
        };

        let Some(record) = record.filter(|_| verified) else {
            warn!(username = %username, "sign-in rejected");
            return Err(AccountError::Unauthorized);
        };

        let token = self
            .tokens
            .issue(&record.username)
            .map_err(|e| AccountError::Internal(format!("token signing: {e}")))?;

        info!(username = %record.username, expires_at = %token.expires_at, "admin signed in");
        Ok(SignedIn {
            token,
            admin: AdminView {
                username: record.username,
                email: record.email,
            },
        })
    }

    /// Built on first use. A failed build is logged and retried on the next call.
    async fn decoy_hash(&self) -> Option<String> {
        if let Some(hash) = self.decoy_hash.get() {
            return Some(hash.clone());
        }
        match self
            .hasher
            .hash_blocking(String::from("decoy-password"))
            .await
        {
            Ok(hash) => Some(self.decoy_hash.get_or_init(|| hash).clone()),
            Err(e) => {
                error!(error = %e, "failed to build decoy hash");
                None
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use tempfile::TempDir;

    use super::{validate_admin_form, AccountError, Accounts, AdminForm, Credentials};
    use crate::db::testing::temp_pool;
    use crate::password::PasswordHasher;
    use crate::store::CredentialStore;
    use crate::token::{SigningSecret, TokenSigner, DEFAULT_TTL};

    fn form(username: &str, email: &str, password: &str) -> AdminForm {
        AdminForm {
            username: String::from(username),
            email: String::from(email),
            password: String::from(password),
        }
    }

    fn creds(username: &str, password: &str) -> Credentials {
        Credentials {
            username: String::from(username),
            password: String::from(password),
        }
    }

    async fn accounts() -> Result<(TempDir, Accounts)> {
        let (dir, pool) = temp_pool().await?;
        let store = CredentialStore::new(pool);
        store.create_table().await?;
        let tokens = TokenSigner::new(&SigningSecret::new("test-secret"), DEFAULT_TTL)?;
        Ok((
            dir,
            Accounts::new(store, PasswordHasher::new(4), Arc::new(tokens)),
        ))
    }

    #[test]
    fn validation_reports_first_failure_in_field_order() {
        let message = |f: AdminForm| validate_admin_form(&f).unwrap_err();

        assert_eq!(message(form("", "", "")), "username is required");
        assert_eq!(message(form("  ", "bad", "")), "username is required");
        assert_eq!(message(form("alice", "", "")), "email is required");
        assert_eq!(
            message(form("alice", "not-an-email", "")),
            "email must be a valid email address"
        );
        assert_eq!(message(form("alice", "a@x.com", "")), "password is required");
        assert_eq!(
            message(form("alice", "a@x.com", &"p".repeat(73))),
            "password must be at most 72 bytes"
        );
        assert!(validate_admin_form(&form("alice", "a@x.com", "s3cret!")).is_ok());
    }

    #[tokio::test]
    async fn register_returns_view_without_hash() -> Result<()> {
        let (_dir, accounts) = accounts().await?;

        let view = accounts.register(form("alice", "a@x.com", "s3cret!")).await?;
        assert_eq!(view.username, "alice");
        assert_eq!(view.email, "a@x.com");

        let stored = accounts.store().find_by_username("alice").await?;
        assert_ne!(stored.password_hash, "s3cret!");
        assert!(stored.password_hash.starts_with("$2"));
        Ok(())
    }

    #[tokio::test]
    async fn register_rejects_invalid_form_without_writing() -> Result<()> {
        let (_dir, accounts) = accounts().await?;

        let result = accounts.register(form("alice", "nope", "pw")).await;
        assert!(matches!(result, Err(AccountError::Validation(_))));
        assert_eq!(accounts.store().count().await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn registering_twice_conflicts() -> Result<()> {
        let (_dir, accounts) = accounts().await?;
        accounts.register(form("alice", "a@x.com", "pw")).await?;

        let by_username = accounts.register(form("alice", "b@x.com", "pw")).await;
        assert!(matches!(by_username, Err(AccountError::Conflict)));

        let by_email = accounts.register(form("bob", "a@x.com", "pw")).await;
        assert!(matches!(by_email, Err(AccountError::Conflict)));

        assert_eq!(accounts.store().count().await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn sign_in_issues_token_for_registered_admin() -> Result<()> {
        let (_dir, accounts) = accounts().await?;
        accounts.register(form("alice", "a@x.com", "s3cret!")).await?;

        let signed_in = accounts.sign_in(creds("alice", "s3cret!")).await?;
        assert_eq!(signed_in.admin.username, "alice");
        assert_eq!(signed_in.admin.email, "a@x.com");

        let claims = accounts.tokens().verify(&signed_in.token.token).unwrap();
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.expires_at, signed_in.token.expires_at);
        Ok(())
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user_fail_identically() -> Result<()> {
        let (_dir, accounts) = accounts().await?;
        accounts.register(form("alice", "a@x.com", "s3cret!")).await?;

        let wrong_password = accounts.sign_in(creds("alice", "wrong")).await.unwrap_err();
        let unknown_user = accounts.sign_in(creds("mallory", "s3cret!")).await.unwrap_err();

        assert!(matches!(wrong_password, AccountError::Unauthorized));
        assert!(matches!(unknown_user, AccountError::Unauthorized));
        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
        assert_eq!(wrong_password.to_string(), "Invalid credentials");
        Ok(())
    }

    #[tokio::test]
    async fn storage_failure_in_uniqueness_check_surfaces_as_storage() -> Result<()> {
        let (_dir, pool) = temp_pool().await?;
        let store = CredentialStore::new(pool.clone());
        store.create_table().await?;
        let tokens = TokenSigner::new(&SigningSecret::new("test-secret"), DEFAULT_TTL)?;
        let accounts = Accounts::new(store, PasswordHasher::new(4), Arc::new(tokens));

        pool.close().await;
        let result = accounts.register(form("alice", "a@x.com", "s3cret!")).await;
        assert!(matches!(result, Err(AccountError::Storage(_))));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_user_caches_a_usable_decoy_hash() -> Result<()> {
        let (_dir, accounts) = accounts().await?;
        assert!(accounts.decoy_hash.get().is_none());

        let result = accounts.sign_in(creds("mallory", "whatever")).await;
        assert!(matches!(result, Err(AccountError::Unauthorized)));

        let decoy = accounts.decoy_hash.get().cloned().unwrap();
        assert!(decoy.starts_with("$2"));
        assert!(accounts.hasher.verify("decoy-password", &decoy));
        Ok(())
    }

    #[tokio::test]
    async fn sign_in_trims_username_like_registration() -> Result<()> {
        let (_dir, accounts) = accounts().await?;
        let view = accounts.register(form(" alice ", "a@x.com", "s3cret!")).await?;
        assert_eq!(view.username, "alice");

        let exact = accounts.sign_in(creds("alice", "s3cret!")).await?;
        assert_eq!(exact.admin.username, "alice");

        let padded = accounts.sign_in(creds("  alice\t", "s3cret!")).await?;
        assert_eq!(padded.admin.username, "alice");
        assert_eq!(
            accounts.tokens().verify(&padded.token.token).unwrap().username,
            "alice"
        );
        Ok(())
    }
}
