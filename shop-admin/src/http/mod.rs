//! HTTP layer: Axum router, authorization gate, handlers and response bodies.
//!
//! Exposes `/api/auth/signup` and `/api/auth/signin`, plus gated resource routes that
//! receive the caller's resolved identity.

mod auth;
mod error;
mod handlers;
mod responses;
mod state;


pub use handlers::router;
pub use state::AppState;
