//! Analytics worker
//!
//! Receives batches of analytics event records, drops malformed ones and
//! writes the rest to PostgreSQL with `ON CONFLICT (event_id) DO NOTHING`.

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod record;
pub mod store;
pub mod worker;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use metrics::WorkerMetrics;
pub use record::{EventRow, RecordError};
pub use store::{EventStore, InMemoryEventStore, PgEventStore};
pub use worker::{EventWorker, ProcessSummary};

/// Service name used for metric labels and pool identification
pub const SERVICE_NAME: &str = "analytics-worker";
