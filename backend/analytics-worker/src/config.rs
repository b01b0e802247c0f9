use db_pool::env_utils::{env_non_empty, parse_env_checked, parse_env_flag};
use db_pool::DbConfig;
use std::time::Duration;

use crate::error::{WorkerError, WorkerResult};
use crate::store::validate_table_name;
use crate::SERVICE_NAME;

pub const DEFAULT_TABLE_NAME: &str = "analytics.events";
pub const DEFAULT_HTTP_PORT: u16 = 8000;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub http_port: u16,
    /// Target table, plain or schema-qualified
    pub table_name: String,
    pub run_migrations: bool,
    pub statement_timeout: Option<Duration>,
    pub db: DbConfig,
}

impl WorkerConfig {
    pub fn from_env() -> WorkerResult<Self> {
        let db = DbConfig::from_env(SERVICE_NAME).map_err(WorkerError::Config)?;

        let table_name =
            env_non_empty("TABLE_NAME").unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string());
        validate_table_name(&table_name)?;

        let statement_timeout = match parse_env_checked::<u64>("WORKER_STATEMENT_TIMEOUT_MS", 0)
            .map_err(WorkerError::Config)?
        {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        Ok(Self {
            http_port: parse_env_checked("PORT", DEFAULT_HTTP_PORT).map_err(WorkerError::Config)?,
            table_name,
            run_migrations: parse_env_flag("RUN_MIGRATIONS", true),
            statement_timeout,
            db,
        })
    }
}
