//! Salted adaptive password hashing backed by bcrypt.
//!
//! The salt and cost factor are embedded in the produced hash string, so a stored hash is
//! self-describing and no separate salt column is needed.

use thiserror::Error;

/// Cost used when none is configured.
pub const DEFAULT_COST: u32 = 12;

/// bcrypt only reads the first 72 bytes of its input.
pub const MAX_PASSWORD_BYTES: usize = 72;

const MIN_COST: u32 = 4;
const MAX_COST: u32 = 31;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("failed to hash password: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error("password hashing task failed: {0}")]
    Join(String),
}

#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(DEFAULT_COST)
    }
}

impl PasswordHasher {
    /// Cost is clamped into the range bcrypt accepts (4..=31).
    pub fn new(cost: u32) -> Self {
        Self {
            cost: cost.clamp(MIN_COST, MAX_COST),
        }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    pub fn hash(&self, raw: &str) -> Result<String, PasswordError> {
        Ok(bcrypt::hash(raw, self.cost)?)
    }

    /// Returns `false` for a mismatch and for a stored hash bcrypt cannot parse.
    pub fn verify(&self, raw: &str, hashed: &str) -> bool {
        bcrypt::verify(raw, hashed).unwrap_or(false)
    }

    /// Hashes on the blocking pool so request workers are not stalled.
    pub async fn hash_blocking(&self, raw: String) -> Result<String, PasswordError> {
        let hasher = *self;
        tokio::task::spawn_blocking(move || hasher.hash(&raw))
            .await
            .map_err(|e| PasswordError::Join(e.to_string()))?
    }

    pub async fn verify_blocking(&self, raw: String, hashed: String) -> bool {
        let hasher = *self;
        tokio::task::spawn_blocking(move || hasher.verify(&raw, &hashed))
            .await
            .unwrap_or(false)
    }
}
