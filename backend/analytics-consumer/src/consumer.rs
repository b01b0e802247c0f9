//! Queue polling loop
//!
//! One [`EventConsumer::run`] call is one execution: it polls until the
//! execution budget drops to the safety margin or a poll yields nothing new,
//! dispatching each batch to the worker before deleting it from the queue.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::budget::ExecutionBudget;
use crate::error::{ConsumerError, ConsumerResult};
use crate::invoker::WorkerInvoker;
use crate::metrics::ConsumerMetrics;
use crate::queue::{DeleteEntry, MessageQueue, ReceiveRequest, MAX_BATCH_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerConfig {
    /// Messages requested per poll, 1..=10
    pub batch_size: usize,
    /// Long-poll wait per receive call
    pub wait_time: Duration,
    pub visibility_timeout: Duration,
    /// Polling stops once the remaining budget is at or below this
    pub safety_margin: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            batch_size: MAX_BATCH_SIZE,
            wait_time: Duration::from_secs(1),
            visibility_timeout: Duration::ZERO,
            safety_margin: Duration::from_millis(10_000),
        }
    }
}

impl ConsumerConfig {
    pub fn validate(&self) -> ConsumerResult<()> {
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(ConsumerError::Config(format!(
                "batch_size must be between 1 and {}, got {}",
                MAX_BATCH_SIZE, self.batch_size
            )));
        }
        Ok(())
    }

    fn receive_request(&self) -> ReceiveRequest {
        ReceiveRequest {
            max_messages: self.batch_size,
            wait_time: self.wait_time,
            visibility_timeout: self.visibility_timeout,
        }
    }
}

/// Result of one consumer execution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Events dispatched to the worker
    pub processed: usize,
    pub batches: usize,
    pub duplicates: usize,
    pub malformed: usize,
    pub delete_failures: usize,
}

pub struct EventConsumer {
    queue: Arc<dyn MessageQueue>,
    invoker: Arc<dyn WorkerInvoker>,
    config: ConsumerConfig,
    metrics: Option<ConsumerMetrics>,
}

impl EventConsumer {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        invoker: Arc<dyn WorkerInvoker>,
        config: ConsumerConfig,
    ) -> ConsumerResult<Self> {
        config.validate()?;

        Ok(Self {
            queue,
            invoker,
            config,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: ConsumerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Drain the queue until the budget runs low or no new messages arrive.
    ///
    /// A dispatch failure aborts the run with the batch still queued. Entries
    /// the queue refuses to delete are counted and left for redelivery.
    pub async fn run(&self, budget: &dyn ExecutionBudget) -> ConsumerResult<RunSummary> {
        let mut summary = RunSummary::default();
        let mut seen: HashSet<String> = HashSet::new();
        let request = self.config.receive_request();

        while budget.remaining() > self.config.safety_margin {
            let messages = self.queue.receive_batch(&request).await?;
            if let Some(metrics) = &self.metrics {
                metrics.messages_received.inc_by(messages.len() as u64);
            }

            let mut records: Vec<Value> = Vec::with_capacity(messages.len());
            let mut to_delete: Vec<DeleteEntry> = Vec::with_capacity(messages.len());
            let mut new_messages = 0usize;

            for message in &messages {
                if !seen.insert(message.message_id.clone()) {
                    debug!(message_id = %message.message_id, "Skipping message already handled in this run");
                    summary.duplicates += 1;
                    if let Some(metrics) = &self.metrics {
                        metrics.duplicates.inc();
                    }
                    continue;
                }
                new_messages += 1;

                match event_schema::decode_body(&message.body) {
                    Ok(record) => {
                        records.push(record);
                        to_delete.push(DeleteEntry::from(message));
                    }
                    Err(e) => {
                        warn!(
                            message_id = %message.message_id,
                            error = %e,
                            "Leaving undecodable message to the queue redrive policy"
                        );
                        summary.malformed += 1;
                        if let Some(metrics) = &self.metrics {
                            metrics.malformed.inc();
                        }
                    }
                }
            }

            if new_messages == 0 {
                debug!(received = messages.len(), "No new messages, stopping");
                break;
            }
            if to_delete.is_empty() {
                debug!(new_messages = new_messages, "Poll held only undecodable messages");
                continue;
            }

            self.invoker.invoke_async(&records).await?;
            summary.processed += to_delete.len();
            summary.batches += 1;
            if let Some(metrics) = &self.metrics {
                metrics.events_dispatched.inc_by(to_delete.len() as u64);
                metrics.batches_dispatched.inc();
            }

            let outcome = self.queue.delete_batch(&to_delete).await?;
            for failure in &outcome.failed {
                warn!(
                    message_id = %failure.id,
                    code = %failure.code,
                    reason = failure.message.as_deref().unwrap_or(""),
                    "Queue refused to delete dispatched message"
                );
            }
            summary.delete_failures += outcome.failed.len();
            if let Some(metrics) = &self.metrics {
                metrics.delete_failures.inc_by(outcome.failed.len() as u64);
            }

            debug!(
                dispatched = to_delete.len(),
                deleted = outcome.deleted,
                "Batch dispatched"
            );
        }

        info!(
            processed = summary.processed,
            batches = summary.batches,
            duplicates = summary.duplicates,
            malformed = summary.malformed,
            delete_failures = summary.delete_failures,
            "Consumer run finished"
        );

        Ok(summary)
    }
}
