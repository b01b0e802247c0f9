//! Batch processing: normalize records, drop malformed ones, store the rest.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::WorkerResult;
use crate::metrics::WorkerMetrics;
use crate::record::EventRow;
use crate::store::EventStore;

/// Counts reported for one processed batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSummary {
    /// Rows in the insert set
    pub processed: usize,
    /// Malformed records excluded before insert
    pub skipped: usize,
    /// Later copies of an `event_id` already present in the batch
    pub duplicates: usize,
    /// Rows actually written; conflicting rows are not counted
    pub inserted: u64,
}

pub struct EventWorker {
    store: Arc<dyn EventStore>,
    metrics: Option<WorkerMetrics>,
}

impl EventWorker {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: WorkerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Process one batch of raw event records.
    ///
    /// Malformed records are logged and skipped. The remaining rows are written
    /// in a single transaction; a storage failure rolls the whole batch back
    /// and is returned as an error.
    pub async fn process(&self, batch: &[Value]) -> WorkerResult<ProcessSummary> {
        let start = Instant::now();
        let mut summary = ProcessSummary::default();
        let mut seen: HashSet<String> = HashSet::with_capacity(batch.len());
        let mut rows = Vec::with_capacity(batch.len());

        for (index, record) in batch.iter().enumerate() {
            let row = match EventRow::from_record(record) {
                Ok(row) => row,
                Err(e) => {
                    let event_id = record.get("event_id").and_then(Value::as_str).unwrap_or("");
                    warn!(
                        index = index,
                        event_id = event_id,
                        error = %e,
                        "Skipping malformed event record"
                    );
                    summary.skipped += 1;
                    continue;
                }
            };

            if !seen.insert(row.event_id.clone()) {
                debug!(event_id = %row.event_id, "Dropping repeated event_id within batch");
                summary.duplicates += 1;
                continue;
            }

            rows.push(row);
        }

        summary.processed = rows.len();

        if let Some(metrics) = &self.metrics {
            metrics.events_received.inc_by(batch.len() as u64);
            metrics.events_skipped.inc_by(summary.skipped as u64);
        }

        if !rows.is_empty() {
            match self.store.insert_events(&rows).await {
                Ok(inserted) => summary.inserted = inserted,
                Err(e) => {
                    error!(
                        rows = rows.len(),
                        transient = e.is_transient(),
                        error = %e,
                        "Failed to store event batch"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.batches_failed.inc();
                        metrics
                            .batch_duration_seconds
                            .observe(start.elapsed().as_secs_f64());
                    }
                    return Err(e);
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.events_inserted.inc_by(summary.inserted);
            metrics
                .batch_duration_seconds
                .observe(start.elapsed().as_secs_f64());
        }

        info!(
            received = batch.len(),
            processed = summary.processed,
            skipped = summary.skipped,
            duplicates = summary.duplicates,
            inserted = summary.inserted,
            "Processed event batch"
        );

        Ok(summary)
    }
}
