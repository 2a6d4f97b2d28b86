//! Service configuration, read from the environment.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL
    pub database_url: String,
    pub port: u16,
    pub max_connections: u32,
    /// NATS server for order events; events are not published when unset
    pub nats_url: Option<String>,
    /// Directory that receives uploaded payment proofs
    pub proof_dir: PathBuf,
    pub discount_cache_ttl: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Ok(Self {
            database_url: var("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            port: parse_or(var("PORT"), "PORT", 8083)?,
            max_connections: parse_or(var("DATABASE_MAX_CONNECTIONS"), "DATABASE_MAX_CONNECTIONS", 10)?,
            nats_url: var("NATS_URL"),
            proof_dir: var("PROOF_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("./uploads/proofs")),
            discount_cache_ttl: Duration::from_secs(parse_or(var("DISCOUNT_CACHE_TTL_SECS"), "DISCOUNT_CACHE_TTL_SECS", 300)?),
        })
    }
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, name: &'static str, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { name, value }),
    }
}
