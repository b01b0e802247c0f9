//! Event storage
//!
//! [`EventStore`] abstracts the idempotent bulk insert so the worker can be
//! exercised without a database. [`PgEventStore`] is the production
//! implementation; [`InMemoryEventStore`] keeps rows in memory with the same
//! unique `event_id` semantics.

use async_trait::async_trait;
use db_pool::MeteredPool;
use event_schema::{CONFLICT_KEY, EVENT_KEYS};
use sqlx::{Postgres, QueryBuilder};
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::{WorkerError, WorkerResult};
use crate::record::EventRow;

/// Upper bound of rows per INSERT statement.
///
/// PostgreSQL accepts at most 65535 bind parameters per statement; with ten
/// columns per row this keeps every statement well below the limit.
pub const MAX_ROWS_PER_STATEMENT: usize = 1000;

/// Storage backend for normalized event rows
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert rows, ignoring any whose `event_id` already exists.
    ///
    /// Either every row is attempted and committed, or nothing is stored.
    ///
    /// # Returns
    ///
    /// Number of rows actually written (conflicting rows are not counted)
    async fn insert_events(&self, rows: &[EventRow]) -> WorkerResult<u64>;
}

/// Check that `name` is a plain or schema-qualified SQL identifier.
///
/// The table name is interpolated into the statement text, so anything beyond
/// `[A-Za-z_][A-Za-z0-9_]*` segments is refused.
pub fn validate_table_name(name: &str) -> WorkerResult<()> {
    let valid_segment = |segment: &str| {
        let mut chars = segment.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };

    let segments: Vec<&str> = name.split('.').collect();
    if segments.len() > 2 || !segments.iter().all(|s| valid_segment(s)) {
        return Err(WorkerError::Config(format!(
            "Invalid table name: {:?} (expected table or schema.table)",
            name
        )));
    }

    Ok(())
}

/// Build the conflict-ignoring bulk insert for one chunk of rows
///
/// ```text
/// INSERT INTO analytics.events (event_id, ..., token_payload)
/// VALUES ($1, ..., $9::jsonb, $10::jsonb), (...)
/// ON CONFLICT (event_id) DO NOTHING
/// ```
pub fn build_insert_query<'a>(table: &str, rows: &'a [EventRow]) -> QueryBuilder<'a, Postgres> {
    let mut builder = QueryBuilder::new(format!(
        "INSERT INTO {} ({}) ",
        table,
        EVENT_KEYS.join(", ")
    ));

    builder.push_values(rows, |mut b, row| {
        b.push_bind(&row.event_id)
            .push_bind(row.event_timestamp)
            .push_bind(&row.event_type)
            .push_bind(&row.event_version)
            .push_bind(&row.app_title)
            .push_bind(&row.app_version)
            .push_bind(&row.user_id)
            .push_bind(&row.user_name)
            .push_bind(&row.meta)
            .push_unseparated("::jsonb")
            .push_bind(&row.token_payload)
            .push_unseparated("::jsonb");
    });

    builder.push(format!(" ON CONFLICT ({}) DO NOTHING", CONFLICT_KEY));
    builder
}

/// PostgreSQL implementation of [`EventStore`]
pub struct PgEventStore {
    pool: MeteredPool,
    table: String,
    statement_timeout: Option<Duration>,
}

impl PgEventStore {
    pub fn new(pool: MeteredPool, table: impl Into<String>) -> WorkerResult<Self> {
        let table = table.into();
        validate_table_name(&table)?;

        Ok(Self {
            pool,
            table,
            statement_timeout: None,
        })
    }

    /// Bound every statement of the insert transaction
    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Fail unless the configured table resolves in the database.
    ///
    /// Migrations only create `analytics.events`; any other `TABLE_NAME`
    /// must be provisioned separately.
    pub async fn verify_table(&self) -> WorkerResult<()> {
        let mut conn = self.pool.acquire().await?;
        let exists: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
            .bind(&self.table)
            .fetch_one(&mut *conn)
            .await?;

        if !exists {
            return Err(WorkerError::Config(format!(
                "Table {} does not exist; migrations only create analytics.events",
                self.table
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn insert_events(&self, rows: &[EventRow]) -> WorkerResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut conn = self.pool.acquire().await?;
        let mut tx = sqlx::Connection::begin(&mut *conn).await?;

        if let Some(timeout) = self.statement_timeout {
            // SET does not take bind parameters; the value is an integer we produced
            sqlx::query(&format!(
                "SET LOCAL statement_timeout = {}",
                timeout.as_millis()
            ))
            .execute(&mut *tx)
            .await?;
        }

        let mut inserted = 0u64;
        for chunk in rows.chunks(MAX_ROWS_PER_STATEMENT) {
            let mut query = build_insert_query(&self.table, chunk);

            match query.build().execute(&mut *tx).await {
                Ok(result) => inserted += result.rows_affected(),
                Err(e) => {
                    error!(
                        table = %self.table,
                        rows = rows.len(),
                        error = %e,
                        "Bulk insert failed, rolling back batch"
                    );
                    if let Err(rollback_err) = tx.rollback().await {
                        warn!(error = %rollback_err, "Rollback failed");
                    }
                    return Err(e.into());
                }
            }
        }

        tx.commit().await?;

        debug!(
            table = %self.table,
            attempted = rows.len(),
            inserted = inserted,
            "Bulk insert committed"
        );

        Ok(inserted)
    }
}

/// In-memory [`EventStore`] honouring the unique `event_id` constraint
#[derive(Default)]
pub struct InMemoryEventStore {
    rows: Mutex<Vec<EventRow>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of stored rows in insertion order
    pub fn rows(&self) -> Vec<EventRow> {
        self.rows
            .lock()
            .map(|rows| rows.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn insert_events(&self, rows: &[EventRow]) -> WorkerResult<u64> {
        let mut stored = self
            .rows
            .lock()
            .map_err(|_| WorkerError::Internal("in-memory store lock poisoned".to_string()))?;

        let mut existing: HashSet<String> = stored.iter().map(|r| r.event_id.clone()).collect();
        let mut inserted = 0u64;

        for row in rows {
            if existing.insert(row.event_id.clone()) {
                stored.push(row.clone());
                inserted += 1;
            }
        }

        if inserted > 0 {
            info!(inserted = inserted, total = stored.len(), "Stored events in memory");
        }

        Ok(inserted)
    }
}
