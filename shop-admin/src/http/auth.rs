//! Request authorization gate.
//!
//! [`authenticated`] runs in front of resource handlers. It never rejects a request: an
//! absent or invalid token resolves to [`Identity::Anonymous`], and each handler decides
//! what an anonymous caller may do.

use std::convert::Infallible;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::cookie::CookieJar;
use tracing::debug;

use crate::token::TokenSigner;

use super::error::ApiError;
use super::state::AppState;

pub const TOKEN_COOKIE: &str = "token";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Anonymous,
    Admin { username: String },
}

impl Identity {
    pub fn username(&self) -> Option<&str> {
        match self {
            Identity::Anonymous => None,
            Identity::Admin { username } => Some(username),
        }
    }

    pub fn require_admin(&self) -> Result<&str, ApiError> {
        self.username()
            .ok_or(ApiError::Unauthorized("authentication required"))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Identity>()
            .cloned()
            .unwrap_or(Identity::Anonymous))
    }
}

/// Middleware: resolves the caller's identity and hands it to the wrapped handler.
pub async fn authenticated(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let identity = resolve_identity(state.accounts.tokens(), request.headers(), &jar);
    request.extensions_mut().insert(identity);
    next.run(request).await
}

pub fn resolve_identity(tokens: &TokenSigner, headers: &HeaderMap, jar: &CookieJar) -> Identity {
    let Some(token) = extract_token(headers, jar) else {
        return Identity::Anonymous;
    };

    match tokens.verify(token) {
        Ok(claims) => {
            debug!(
                username = %claims.username,
                expires_at = %claims.expires_at,
                "request identified"
            );
            Identity::Admin {
                username: claims.username,
            }
        }
        Err(rejection) => {
            debug!(reason = %rejection, "presented token rejected; continuing anonymously");
            Identity::Anonymous
        }
    }
}

/// Token from `Authorization` (`Bearer <token>` or the bare token), else the `token` cookie.
pub fn extract_token<'a>(headers: &'a HeaderMap, jar: &'a CookieJar) -> Option<&'a str> {
    let from_header = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_authorization);

    from_header.or_else(|| {
        jar.get(TOKEN_COOKIE)
            .map(|cookie| cookie.value())
            .filter(|value| !value.is_empty())
    })
}

fn parse_authorization(raw: &str) -> Option<&str> {
    let mut parts = raw.split_whitespace();
    let first = parts.next()?;
    match (parts.next(), parts.next()) {
        (None, _) => Some(first),
        (Some(token), None) if first.eq_ignore_ascii_case("bearer") => Some(token),
        _ => None,
    }
}
