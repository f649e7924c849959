use std::sync::Arc;

use anyhow::Context;
use sqlx::SqlitePool;

use crate::accounts::Accounts;
use crate::collections::CollectionStore;
use crate::password::PasswordHasher;
use crate::products::ProductStore;
use crate::store::CredentialStore;
use crate::token::TokenSigner;
use crate::users::UserStore;

#[derive(Debug, Clone)]
pub struct AppState {
    pub accounts: Accounts,
    pub products: ProductStore,
    pub collections: CollectionStore,
    pub users: UserStore,
    pub hasher: PasswordHasher,
}

impl AppState {
    pub fn new(pool: SqlitePool, hasher: PasswordHasher, tokens: Arc<TokenSigner>) -> Self {
        Self {
            accounts: Accounts::new(CredentialStore::new(pool.clone()), hasher, tokens),
            products: ProductStore::new(pool.clone()),
            collections: CollectionStore::new(pool.clone()),
            users: UserStore::new(pool),
            hasher,
        }
    }

    /// Creates every table the handlers rely on. Safe to call on each startup.
    pub async fn create_tables(&self) -> anyhow::Result<()> {
        self.accounts
            .store()
            .create_table()
            .await
            .context("admin table")?;
        self.products
            .create_table()
            .await
            .context("products table")?;
        self.collections
            .create_table()
            .await
            .context("collections table")?;
        self.users.create_table().await.context("users table")?;
        Ok(())
    }
}
