//! PostgreSQL pool for the analytics worker
//!
//! [`DbConfig`] is read from the environment, [`MeteredPool::connect`] opens
//! the pool and proves the server answers before the worker starts serving.
//! Every connection the worker takes goes through [`MeteredPool::acquire`],
//! which feeds [`PoolMetrics`].

pub mod env_utils;
mod metrics;

pub use metrics::PoolMetrics;

use env_utils::{parse_env_required, parse_env_with_default};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Connection, Postgres};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("invalid database configuration: {0}")]
    Config(#[source] sqlx::Error),

    #[error("database did not answer: {0}")]
    Unreachable(#[source] sqlx::Error),

    #[error("database did not answer within {0:?}")]
    Timeout(Duration),
}

/// Database connection pool configuration
#[derive(Clone)]
pub struct DbConfig {
    /// Service name for metrics labeling
    pub service_name: String,
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Bound on the startup round trip
    pub connect_timeout_secs: u64,
    /// Bound on waiting for a free pooled connection
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("service_name", &self.service_name)
            .field("database_url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .field("idle_timeout_secs", &self.idle_timeout_secs)
            .field("max_lifetime_secs", &self.max_lifetime_secs)
            .finish()
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        // One worker handles one batch at a time, a handful of connections is plenty
        Self {
            service_name: String::from("unknown"),
            database_url: String::new(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout_secs: 5,
            acquire_timeout_secs: 10,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
        }
    }
}

impl DbConfig {
    /// Load configuration from `DATABASE_URL` and the optional `DB_*` overrides
    pub fn from_env(service_name: &str) -> Result<Self, String> {
        let defaults = Self::default();

        Ok(Self {
            service_name: service_name.to_string(),
            database_url: parse_env_required("DATABASE_URL")?,
            max_connections: parse_env_with_default("DB_MAX_CONNECTIONS", defaults.max_connections),
            min_connections: parse_env_with_default("DB_MIN_CONNECTIONS", defaults.min_connections),
            connect_timeout_secs: parse_env_with_default(
                "DB_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout_secs,
            ),
            acquire_timeout_secs: parse_env_with_default(
                "DB_ACQUIRE_TIMEOUT_SECS",
                defaults.acquire_timeout_secs,
            ),
            idle_timeout_secs: parse_env_with_default(
                "DB_IDLE_TIMEOUT_SECS",
                defaults.idle_timeout_secs,
            ),
            max_lifetime_secs: parse_env_with_default(
                "DB_MAX_LIFETIME_SECS",
                defaults.max_lifetime_secs,
            ),
        })
    }

    pub fn log_config(&self) {
        info!(
            service = %self.service_name,
            max_connections = self.max_connections,
            min_connections = self.min_connections,
            connect_timeout_secs = self.connect_timeout_secs,
            acquire_timeout_secs = self.acquire_timeout_secs,
            idle_timeout_secs = self.idle_timeout_secs,
            max_lifetime_secs = self.max_lifetime_secs,
            "Database pool configuration"
        );
    }

    /// Pool options derived from this configuration
    ///
    /// `min_connections` is clamped to `max_connections` so a bad override
    /// cannot make the pool unusable.
    pub fn pool_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections.max(1))
            .min_connections(self.min_connections.min(self.max_connections.max(1)))
            .acquire_timeout(Duration::from_secs(self.acquire_timeout_secs))
            .idle_timeout(Duration::from_secs(self.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(self.max_lifetime_secs))
            .test_before_acquire(true)
    }
}

/// PostgreSQL pool that records acquisition latency, failures and occupancy
#[derive(Clone)]
pub struct MeteredPool {
    pool: PgPool,
    metrics: PoolMetrics,
}

impl MeteredPool {
    /// Open the pool and ping the server once.
    ///
    /// Connections are opened lazily; the ping is the first one, bounded by
    /// `connect_timeout_secs`, so a wrong host fails startup instead of the
    /// first batch.
    pub async fn connect(config: &DbConfig) -> Result<Self, PoolError> {
        let pool = config
            .pool_options()
            .connect_lazy(&config.database_url)
            .map_err(PoolError::Config)?;
        let metered = Self {
            pool,
            metrics: PoolMetrics::new(&config.service_name),
        };

        metered
            .ping(Duration::from_secs(config.connect_timeout_secs))
            .await?;

        info!(service = %config.service_name, "Database pool connected");
        Ok(metered)
    }

    /// Round trip to the server through a pooled connection
    pub async fn ping(&self, timeout: Duration) -> Result<(), PoolError> {
        let round_trip = async {
            let mut conn = self.acquire().await?;
            conn.ping().await
        };

        match tokio::time::timeout(timeout, round_trip).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                warn!(error = %e, "Database ping failed");
                Err(PoolError::Unreachable(e))
            }
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "Database ping timed out");
                Err(PoolError::Timeout(timeout))
            }
        }
    }

    /// Take a connection, recording how long the wait took
    pub async fn acquire(&self) -> Result<PoolConnection<Postgres>, sqlx::Error> {
        let start = Instant::now();
        let result = self.pool.acquire().await;

        self.metrics
            .observe_acquire(start.elapsed(), result.as_ref().err());
        self.metrics.record_occupancy(&self.pool);

        result
    }

    /// Underlying pool, for migrations and ad hoc queries
    pub fn pg(&self) -> &PgPool {
        &self.pool
    }

    pub fn metrics(&self) -> &PoolMetrics {
        &self.metrics
    }
}
