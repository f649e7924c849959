use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use thiserror::Error;

use crate::password;
use crate::token::{SigningSecret, DEFAULT_TTL};

const DEFAULT_PORT: u16 = 1337;
const DEFAULT_DATABASE_URL: &str = "sqlite://shop-admin.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Parser)]
#[command(
    name = "shop-admin",
    version,
    about = "E-commerce admin backend with JWT admin authentication"
)]
pub struct Cli {
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<SocketAddr>,

    #[arg(long, value_name = "URL")]
    pub database_url: Option<String>,

    /// Lifetime of issued tokens, e.g. `5m` or `1h`.
    #[arg(long, value_name = "DURATION")]
    pub token_ttl: Option<String>,

    #[arg(long, value_name = "COST")]
    pub bcrypt_cost: Option<u32>,

    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub database_url: String,
    pub max_connections: u32,
    pub jwt_secret: SigningSecret,
    pub token_ttl: Duration,
    pub bcrypt_cost: u32,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config in {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid token ttl {value:?}: {source}")]
    InvalidTtl {
        value: String,
        source: humantime::DurationError,
    },
    #[error("token ttl must be greater than zero")]
    ZeroTtl,
    #[error("invalid port in env var PORT: {0}")]
    InvalidPort(String),
    #[error("env var {0} is not valid unicode")]
    NotUnicode(&'static str),
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    bind: Option<SocketAddr>,
    database_url: Option<String>,
    max_connections: Option<u32>,
    token_ttl: Option<String>,
    bcrypt_cost: Option<u32>,
}

/// Values taken from the process environment at startup.
#[derive(Debug, Default)]
pub struct EnvOverrides {
    pub jwt_secret: Option<String>,
    pub port: Option<String>,
    pub database_url: Option<String>,
}

impl EnvOverrides {
    pub fn from_process() -> Result<Self, ConfigError> {
        Ok(Self {
            jwt_secret: read_env("JWT_SECRET")?,
            port: read_env("PORT")?,
            database_url: read_env("DATABASE_URL")?,
        })
    }
}

impl AppConfig {
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let from_file = read_file_config(cli.config.as_deref())?;
        let env = EnvOverrides::from_process()?;
        Self::resolve(cli, from_file, env)
    }

    /// Precedence: command line, then environment, then config file, then defaults.
    fn resolve(cli: Cli, file: FileConfig, env: EnvOverrides) -> Result<Self, ConfigError> {
        let env_bind = env
            .port
            .as_deref()
            .map(parse_port)
            .transpose()?
            .map(|port| SocketAddr::from(([0, 0, 0, 0], port)));
        let bind = cli
            .bind
            .or(env_bind)
            .or(file.bind)
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)));

        let database_url = cli
            .database_url
            .or(env.database_url)
            .or(file.database_url)
            .unwrap_or_else(|| String::from(DEFAULT_DATABASE_URL));

        let token_ttl = match cli.token_ttl.or(file.token_ttl) {
            Some(raw) => parse_ttl(&raw)?,
            None => DEFAULT_TTL,
        };

        let bcrypt_cost = cli
            .bcrypt_cost
            .or(file.bcrypt_cost)
            .unwrap_or(password::DEFAULT_COST);

        Ok(Self {
            bind,
            database_url,
            max_connections: file
                .max_connections
                .unwrap_or(DEFAULT_MAX_CONNECTIONS)
                .max(1),
            jwt_secret: SigningSecret::new(env.jwt_secret.unwrap_or_default()),
            token_ttl,
            bcrypt_cost,
        })
    }
}

fn read_file_config(path: Option<&Path>) -> Result<FileConfig, ConfigError> {
    let Some(path) = path else {
        return Ok(FileConfig::default());
    };

    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;

    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

fn read_env(key: &'static str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => Ok(Some(value)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::NotUnicode(key)),
    }
}

fn parse_port(raw: &str) -> Result<u16, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidPort(String::from(raw)))
}

fn parse_ttl(raw: &str) -> Result<Duration, ConfigError> {
    let ttl = humantime::parse_duration(raw.trim()).map_err(|source| ConfigError::InvalidTtl {
        value: String::from(raw),
        source,
    })?;
    if ttl.is_zero() {
        return Err(ConfigError::ZeroTtl);
    }
    Ok(ttl)
}
