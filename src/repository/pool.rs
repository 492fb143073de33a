//! PostgreSQL connection pool.
//!
//! A bounded `deadpool` pool of `tokio_postgres` clients. Connections are
//! returned to the pool when their guard is dropped, so every exit path of
//! a request (success, error, cancellation) gives the connection back.

use std::fmt::Display;
use std::time::Duration;

use deadpool::managed::{self, Manager, Metrics, Object, Pool, RecycleError, RecycleResult};
use thiserror::Error;
use tokio_postgres::Client;
use tracing::{debug, info};

use super::pg_tls;
use super::util::redact_url_password;
use crate::config::DatabaseConfig;

/// Errors creating the pool or borrowing from it.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("invalid database configuration: {0}")]
    Config(String),

    #[error("failed to build pool: {0}")]
    Build(String),

    #[error("timed out after {0:?} waiting for a connection")]
    Timeout(Duration),

    #[error("pool is closed")]
    Closed,

    #[error("connection failed: {0}")]
    Connect(String),
}

/// Size and wait bounds of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    /// Connections opened when the pool is created.
    pub min_size: usize,
    /// Upper bound on open connections.
    pub max_size: usize,
    /// How long a request may wait for a free connection.
    pub acquire_timeout: Duration,
}

impl From<&DatabaseConfig> for PoolSettings {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            min_size: config.pool_min,
            max_size: config.pool_max,
            acquire_timeout: Duration::from_secs(config.acquire_timeout_secs),
        }
    }
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub max_size: usize,
    /// Open connections.
    pub size: usize,
    /// Open connections not checked out.
    pub available: usize,
    /// Connections currently checked out.
    pub in_use: usize,
}

impl PoolStatus {
    pub fn of<M: Manager>(pool: &Pool<M>) -> Self {
        let status = pool.status();
        let size = status.size;
        let available = status.available as usize;
        Self {
            max_size: status.max_size,
            size,
            available,
            in_use: size.saturating_sub(available),
        }
    }
}

/// Builds `tokio_postgres` clients for the pool.
#[derive(Clone)]
pub struct PgManager {
    config: tokio_postgres::Config,
    tls: bool,
}

impl PgManager {
    pub fn new(config: tokio_postgres::Config, tls: bool) -> Self {
        Self { config, tls }
    }

    /// Manager for the configured database.
    pub fn from_config(db: &DatabaseConfig) -> Result<Self, PoolError> {
        Ok(Self::new(pg_config(db)?, db.tls))
    }
}

impl Manager for PgManager {
    type Type = Client;
    type Error = tokio_postgres::Error;

    async fn create(&self) -> Result<Client, tokio_postgres::Error> {
        debug!("Opening PostgreSQL connection");
        pg_tls::connect(&self.config, self.tls).await
    }

    async fn recycle(
        &self,
        client: &mut Client,
        _: &Metrics,
    ) -> RecycleResult<tokio_postgres::Error> {
        // A closed client fails this immediately and is replaced.
        client
            .simple_query("")
            .await
            .map(|_| ())
            .map_err(RecycleError::Backend)
    }
}

/// Connection settings for `db`.
///
/// `DATABASE_URL` style URLs win over the individual fields. Server-side
/// statement timeout and read-only sessions are passed as startup options.
pub fn pg_config(db: &DatabaseConfig) -> Result<tokio_postgres::Config, PoolError> {
    let mut config = match db.url.as_deref() {
        Some(url) => url.parse::<tokio_postgres::Config>().map_err(|e| {
            PoolError::Config(format!("{}: {}", redact_url_password(url), e))
        })?,
        None => {
            let mut config = tokio_postgres::Config::new();
            config
                .host(&db.host)
                .port(db.port)
                .user(&db.user)
                .password(&db.password)
                .dbname(&db.database);
            config
        }
    };

    let mut options = vec![format!(
        "-c statement_timeout={}",
        db.statement_timeout_secs * 1000
    )];
    if db.read_only {
        options.push("-c default_transaction_read_only=on".to_string());
    }
    config
        .options(&options.join(" "))
        .application_name("vidstats")
        .connect_timeout(Duration::from_secs(db.acquire_timeout_secs.max(1)));

    Ok(config)
}

/// Build a pool and open `min_size` connections up front.
///
/// Opening the first connections here surfaces bad hosts or credentials
/// before any question is taken.
pub async fn build_pool<M>(manager: M, settings: &PoolSettings) -> Result<Pool<M>, PoolError>
where
    M: Manager,
    M::Error: Display,
{
    let pool = Pool::builder(manager)
        .max_size(settings.max_size)
        .build()
        .map_err(|e| PoolError::Build(e.to_string()))?;

    let mut warm = Vec::with_capacity(settings.min_size);
    for _ in 0..settings.min_size {
        warm.push(acquire(&pool, settings.acquire_timeout).await?);
    }
    drop(warm);

    info!(
        "Database pool created (min {}, max {})",
        settings.min_size, settings.max_size
    );
    Ok(pool)
}

/// Borrow a connection, waiting at most `timeout`.
pub async fn acquire<M>(pool: &Pool<M>, timeout: Duration) -> Result<Object<M>, PoolError>
where
    M: Manager,
    M::Error: Display,
{
    match tokio::time::timeout(timeout, pool.get()).await {
        Ok(Ok(conn)) => Ok(conn),
        Ok(Err(managed::PoolError::Closed)) => Err(PoolError::Closed),
        Ok(Err(managed::PoolError::Backend(e))) => Err(PoolError::Connect(e.to_string())),
        Ok(Err(e)) => Err(PoolError::Connect(e.to_string())),
        Err(_) => Err(PoolError::Timeout(timeout)),
    }
}
