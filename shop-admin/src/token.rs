//! Signed, time-limited bearer tokens (HS256 JWT) carrying an admin username.
//!
//! Verification is a pure function of the token, the current instant and the signing
//! secret. Nothing is stored server-side, so a token stays valid until it expires.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Lifetime of a token issued at sign-in when none is configured.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Server-wide HMAC secret. Loaded once at startup and never rotated.
#[derive(Clone, Default)]
pub struct SigningSecret(String);

impl SigningSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningSecret(<redacted>)")
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token ttl {0:?} is out of range")]
    TtlOutOfRange(Duration),
    #[error("expiry timestamp overflowed")]
    ExpiryOverflow,
    #[error("failed to sign token: {0}")]
    Sign(#[from] jsonwebtoken::errors::Error),
}

/// Why a presented token was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenRejection {
    #[error("malformed token")]
    Malformed,
    #[error("bad signature")]
    BadSignature,
    #[error("token expired")]
    Expired,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    username: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedClaims {
    pub username: String,
    pub expires_at: DateTime<Utc>,
}

pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: TimeDelta,
}

impl fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSigner")
            .field("algorithm", &Algorithm::HS256)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenSigner {
    pub fn new(secret: &SigningSecret, ttl: Duration) -> Result<Self, TokenError> {
        let ttl = TimeDelta::from_std(ttl).map_err(|_| TokenError::TtlOutOfRange(ttl))?;

        // Expiry is checked by hand against an explicit instant in `verify_at`.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;

        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
        })
    }

    pub fn ttl(&self) -> TimeDelta {
        self.ttl
    }

    pub fn issue(&self, username: &str) -> Result<IssuedToken, TokenError> {
        self.issue_at(username, Utc::now())
    }

    /// Issues a token as if the current instant were `now`.
    ///
    /// `now` is truncated to whole seconds so that `expires_at` is exactly representable
    /// in the JWT `exp` claim.
    pub fn issue_at(&self, username: &str, now: DateTime<Utc>) -> Result<IssuedToken, TokenError> {
        let issued_at =
            DateTime::from_timestamp(now.timestamp(), 0).ok_or(TokenError::ExpiryOverflow)?;
        let expires_at = issued_at
            .checked_add_signed(self.ttl)
            .ok_or(TokenError::ExpiryOverflow)?;

        let claims = Claims {
            username: username.to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;

        Ok(IssuedToken { token, expires_at })
    }

    pub fn verify(&self, token: &str) -> Result<VerifiedClaims, TokenRejection> {
        self.verify_at(token, Utc::now())
    }

    /// Accepts the token iff its signature matches and `now` is strictly before expiry.
    pub fn verify_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifiedClaims, TokenRejection> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            debug!(error = %e, "token rejected");
            match e.kind() {
                ErrorKind::InvalidSignature => TokenRejection::BadSignature,
                _ => TokenRejection::Malformed,
            }
        })?;

        let expires_at =
            DateTime::from_timestamp(data.claims.exp, 0).ok_or(TokenRejection::Malformed)?;
        if now >= expires_at {
            return Err(TokenRejection::Expired);
        }

        Ok(VerifiedClaims {
            username: data.claims.username,
            expires_at,
        })
    }
}
