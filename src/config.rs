//! Service configuration, read from the environment.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};

pub const DEFAULT_DATABASE: &str = "registry.db";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";

/// Where the record store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseTarget {
    Memory,
    File(PathBuf),
}

impl DatabaseTarget {
    /// Parse a connection string.
    ///
    /// Accepts `sqlite::memory:`, `:memory:`, `sqlite://<path>`, `sqlite:<path>`
    /// or a bare path. Other URL schemes are rejected.
    pub fn parse(url: &str) -> Result<Self> {
        let url = url.trim();
        if url.is_empty() {
            bail!("database connection string is empty");
        }

        let rest = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);

        if rest == ":memory:" {
            return Ok(DatabaseTarget::Memory);
        }
        if rest.is_empty() {
            bail!("database connection string '{}' names no file", url);
        }
        if let Some((scheme, _)) = rest.split_once("://") {
            bail!("unsupported database scheme '{}' (only sqlite is available)", scheme);
        }

        Ok(DatabaseTarget::File(PathBuf::from(rest)))
    }
}

impl std::fmt::Display for DatabaseTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseTarget::Memory => write!(f, "sqlite::memory:"),
            DatabaseTarget::File(path) => write!(f, "sqlite://{}", path.display()),
        }
    }
}

/// Configuration for the registry service
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Backing database, from `DATABASE_URL`
    pub database: DatabaseTarget,
    /// Listen address, from `REGISTRY_BIND_ADDR`
    pub bind_addr: SocketAddr,
}

impl RegistryConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(
            env::var("DATABASE_URL").ok().as_deref(),
            env::var("REGISTRY_BIND_ADDR").ok().as_deref(),
        )
    }

    fn from_vars(database_url: Option<&str>, bind_addr: Option<&str>) -> Result<Self> {
        let database = DatabaseTarget::parse(database_url.unwrap_or(DEFAULT_DATABASE))
            .context("invalid DATABASE_URL")?;
        let bind_addr = bind_addr
            .unwrap_or(DEFAULT_BIND_ADDR)
            .parse()
            .context("invalid REGISTRY_BIND_ADDR")?;

        Ok(Self { database, bind_addr })
    }
}
