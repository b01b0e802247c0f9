//! Analytics queue consumer
//!
//! Pulls SNS-wrapped analytics events from SQS, drops messages already seen in
//! the current run, and hands each batch to the analytics worker
//! asynchronously before deleting it from the queue.

pub mod budget;
pub mod config;
pub mod consumer;
pub mod error;
pub mod http;
pub mod invoker;
pub mod metrics;
pub mod queue;

pub use budget::{DeadlineBudget, ExecutionBudget};
pub use config::{AppConfig, WorkerTarget};
pub use consumer::{ConsumerConfig, EventConsumer, RunSummary};
pub use error::{ConsumerError, ConsumerResult};
pub use invoker::{HttpInvoker, LambdaInvoker, WorkerInvoker};
pub use metrics::ConsumerMetrics;
pub use queue::{InMemoryQueue, MessageQueue, QueueMessage, SqsQueue};

pub const SERVICE_NAME: &str = "analytics-consumer";
