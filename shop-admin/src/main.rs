//! # shop-admin
//!
//! Small e-commerce admin backend with JWT-based admin authentication.
//!
//! ## Architecture
//!
//! - **Store**: SQLite via `sqlx`; admin credentials with unique username and email
//! - **Password**: bcrypt hashing with a configurable cost
//! - **Token**: HS256 JWTs signed with `JWT_SECRET`, five minute lifetime by default
//! - **Accounts**: registration and sign-in flows on top of the three above
//! - **Resources**: products, collections and shop customers; plain one-table reads and writes
//! - **HTTP**: Axum router with an authorization gate in front of resource routes

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used)]

mod accounts;
mod collections;
mod config;
mod db;
mod http;
mod password;
mod products;
mod store;
mod token;
mod users;

use std::sync::Arc;

use anyhow::Context;
use axum::serve;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, Cli};
use crate::http::{router, AppState};
use crate::password::PasswordHasher;
use crate::token::TokenSigner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging().context("failed to initialize logging")?;

    let cli = Cli::parse();
    let config = AppConfig::from_cli(cli).context("failed to load configuration")?;
    info!(
        bind = %config.bind,
        database_url = %config.database_url,
        max_connections = config.max_connections,
        "configuration loaded"
    );

    if config.jwt_secret.is_empty() {
        warn!("JWT_SECRET is empty; issued tokens can be forged by anyone");
    }

    let tokens = TokenSigner::new(&config.jwt_secret, config.token_ttl)
        .context("failed to initialize token signer")?;
    let hasher = PasswordHasher::new(config.bcrypt_cost);
    info!(
        token_ttl_seconds = tokens.ttl().num_seconds(),
        bcrypt_cost = hasher.cost(),
        "auth configured"
    );

    let pool = db::connect(&config.database_url, config.max_connections)
        .await
        .with_context(|| format!("failed to open database {}", config.database_url))?;

    let state = AppState::new(pool, hasher, Arc::new(tokens));
    state
        .create_tables()
        .await
        .context("failed to create database tables")?;
    let admins = state
        .accounts
        .store()
        .count()
        .await
        .context("failed to count admins")?;
    info!(admins, "database schema ready");

    let app = router(state);
    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    let shutdown = tokio::signal::ctrl_c();
    info!(bind = %config.bind, "shop-admin listening");

    serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = shutdown.await;
            info!("shutting down gracefully");
        })
        .await
        .context("server exited with error")
}

/// Initialize tracing subscriber with `RUST_LOG` env filter (default: `info`).
fn init_logging() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    Ok(())
}
