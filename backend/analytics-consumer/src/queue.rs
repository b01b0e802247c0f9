//! Queue access
//!
//! [`MessageQueue`] covers the two calls the consumer makes: receive a batch
//! and delete a batch. [`SqsQueue`] talks to Amazon SQS; [`InMemoryQueue`]
//! models a single SQS queue with zero visibility timeout.

use async_trait::async_trait;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::DeleteMessageBatchRequestEntry;
use aws_sdk_sqs::Client;
use event_schema::QueueEnvelope;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ConsumerError, ConsumerResult};

/// SQS rejects receive and delete batches larger than this
pub const MAX_BATCH_SIZE: usize = 10;

/// One received message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Stable across redeliveries; used for in-run deduplication
    pub message_id: String,
    /// Token for deleting this particular delivery
    pub receipt_handle: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveRequest {
    pub max_messages: usize,
    pub wait_time: Duration,
    pub visibility_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteEntry {
    pub id: String,
    pub receipt_handle: String,
}

impl From<&QueueMessage> for DeleteEntry {
    fn from(message: &QueueMessage) -> Self {
        Self {
            id: message.message_id.clone(),
            receipt_handle: message.receipt_handle.clone(),
        }
    }
}

/// Per-entry failure reported by a bulk delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteFailure {
    pub id: String,
    pub code: String,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub deleted: usize,
    pub failed: Vec<DeleteFailure>,
}

#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn receive_batch(&self, request: &ReceiveRequest) -> ConsumerResult<Vec<QueueMessage>>;

    /// Delete entries in one call. Per-entry failures are reported in the
    /// outcome; an error means the call itself failed.
    async fn delete_batch(&self, entries: &[DeleteEntry]) -> ConsumerResult<DeleteOutcome>;
}

/// Amazon SQS queue
#[derive(Clone)]
pub struct SqsQueue {
    client: Client,
    queue_url: String,
}

impl SqsQueue {
    pub fn new(client: Client, queue_url: impl Into<String>) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
        }
    }

    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }
}

fn duration_secs_i32(duration: Duration) -> i32 {
    i32::try_from(duration.as_secs()).unwrap_or(i32::MAX)
}

#[async_trait]
impl MessageQueue for SqsQueue {
    async fn receive_batch(&self, request: &ReceiveRequest) -> ConsumerResult<Vec<QueueMessage>> {
        let max_messages = request.max_messages.clamp(1, MAX_BATCH_SIZE) as i32;

        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max_messages)
            .wait_time_seconds(duration_secs_i32(request.wait_time))
            .visibility_timeout(duration_secs_i32(request.visibility_timeout))
            .send()
            .await
            .map_err(|e| {
                ConsumerError::Queue(format!("receive_message failed: {}", DisplayErrorContext(&e)))
            })?;

        let messages = output
            .messages()
            .iter()
            .filter_map(|m| {
                match (m.message_id(), m.receipt_handle()) {
                    (Some(message_id), Some(receipt_handle)) => Some(QueueMessage {
                        message_id: message_id.to_string(),
                        receipt_handle: receipt_handle.to_string(),
                        body: m.body().unwrap_or_default().to_string(),
                    }),
                    _ => {
                        warn!(
                            message_id = ?m.message_id(),
                            "Ignoring SQS message without id or receipt handle"
                        );
                        None
                    }
                }
            })
            .collect();

        Ok(messages)
    }

    async fn delete_batch(&self, entries: &[DeleteEntry]) -> ConsumerResult<DeleteOutcome> {
        if entries.is_empty() {
            return Ok(DeleteOutcome::default());
        }

        let request_entries = entries
            .iter()
            .map(|entry| {
                DeleteMessageBatchRequestEntry::builder()
                    .id(&entry.id)
                    .receipt_handle(&entry.receipt_handle)
                    .build()
                    .map_err(|e| ConsumerError::Queue(format!("invalid delete entry: {}", e)))
            })
            .collect::<ConsumerResult<Vec<_>>>()?;

        let output = self
            .client
            .delete_message_batch()
            .queue_url(&self.queue_url)
            .set_entries(Some(request_entries))
            .send()
            .await
            .map_err(|e| {
                ConsumerError::Queue(format!(
                    "delete_message_batch failed: {}",
                    DisplayErrorContext(&e)
                ))
            })?;

        let failed = output
            .failed()
            .iter()
            .map(|f| DeleteFailure {
                id: f.id().to_string(),
                code: f.code().to_string(),
                message: f.message().map(str::to_string),
            })
            .collect();

        Ok(DeleteOutcome {
            deleted: output.successful().len(),
            failed,
        })
    }
}

#[derive(Debug, Clone)]
struct StoredMessage {
    message_id: String,
    receipt_handle: String,
    body: String,
    in_flight: bool,
}

#[derive(Debug, Default)]
struct InMemoryState {
    messages: VecDeque<StoredMessage>,
    rejected_deletes: HashSet<String>,
    receive_calls: usize,
    delete_calls: usize,
}

/// In-memory queue
///
/// Every receive returns the oldest visible messages. With a zero visibility
/// timeout nothing is hidden; with a non-zero one a received message stays
/// invisible until [`InMemoryQueue::expire_visibility`] is called. Deleting
/// removes the delivery identified by its receipt handle; other copies of the
/// same message id stay queued.
#[derive(Debug, Default)]
pub struct InMemoryQueue {
    state: Mutex<InMemoryState>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> ConsumerResult<std::sync::MutexGuard<'_, InMemoryState>> {
        self.state
            .lock()
            .map_err(|_| ConsumerError::Queue("in-memory queue lock poisoned".to_string()))
    }

    /// Enqueue a raw body, returning the new message id
    pub fn send_body(&self, body: impl Into<String>) -> ConsumerResult<String> {
        let message_id = Uuid::new_v4().to_string();
        self.lock()?.messages.push_back(StoredMessage {
            message_id: message_id.clone(),
            receipt_handle: Uuid::new_v4().to_string(),
            body: body.into(),
            in_flight: false,
        });
        Ok(message_id)
    }

    /// Wrap a record in a notification envelope and enqueue it
    pub fn publish<T: Serialize>(&self, record: &T) -> ConsumerResult<String> {
        let body = QueueEnvelope::wrap(record)
            .and_then(|envelope| envelope.to_body())
            .map_err(|e| ConsumerError::Queue(e.to_string()))?;
        self.send_body(body)
    }

    /// Enqueue a second delivery of an existing message
    pub fn redeliver(&self, message_id: &str) -> ConsumerResult<()> {
        let mut state = self.lock()?;
        let original = state
            .messages
            .iter()
            .find(|m| m.message_id == message_id)
            .cloned()
            .ok_or_else(|| ConsumerError::Queue(format!("unknown message id {}", message_id)))?;

        state.messages.push_back(StoredMessage {
            receipt_handle: Uuid::new_v4().to_string(),
            in_flight: false,
            ..original
        });
        Ok(())
    }

    /// Make every in-flight message visible again
    pub fn expire_visibility(&self) -> ConsumerResult<()> {
        for message in self.lock()?.messages.iter_mut() {
            message.in_flight = false;
        }
        Ok(())
    }

    /// Make deletes of `message_id` fail with `ReceiptHandleIsInvalid`
    pub fn reject_deletes_for(&self, message_id: &str) -> ConsumerResult<()> {
        self.lock()?.rejected_deletes.insert(message_id.to_string());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.messages.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn receive_calls(&self) -> usize {
        self.state.lock().map(|s| s.receive_calls).unwrap_or(0)
    }

    pub fn delete_calls(&self) -> usize {
        self.state.lock().map(|s| s.delete_calls).unwrap_or(0)
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn receive_batch(&self, request: &ReceiveRequest) -> ConsumerResult<Vec<QueueMessage>> {
        let mut state = self.lock()?;
        state.receive_calls += 1;

        let limit = request.max_messages.clamp(1, MAX_BATCH_SIZE);
        let hide = !request.visibility_timeout.is_zero();
        let mut messages = Vec::with_capacity(limit);

        for stored in state.messages.iter_mut().filter(|m| !m.in_flight).take(limit) {
            stored.in_flight = hide;
            messages.push(QueueMessage {
                message_id: stored.message_id.clone(),
                receipt_handle: stored.receipt_handle.clone(),
                body: stored.body.clone(),
            });
        }

        debug!(received = messages.len(), "In-memory receive");
        Ok(messages)
    }

    async fn delete_batch(&self, entries: &[DeleteEntry]) -> ConsumerResult<DeleteOutcome> {
        if entries.len() > MAX_BATCH_SIZE {
            return Err(ConsumerError::Queue(format!(
                "TooManyEntriesInBatchRequest: {} entries",
                entries.len()
            )));
        }

        let mut state = self.lock()?;
        state.delete_calls += 1;

        let mut outcome = DeleteOutcome::default();
        for entry in entries {
            let position = state
                .messages
                .iter()
                .position(|m| m.receipt_handle == entry.receipt_handle);

            match position {
                Some(index) if !state.rejected_deletes.contains(&entry.id) => {
                    state.messages.remove(index);
                    outcome.deleted += 1;
                }
                _ => outcome.failed.push(DeleteFailure {
                    id: entry.id.clone(),
                    code: "ReceiptHandleIsInvalid".to_string(),
                    message: Some(format!("receipt handle not accepted for {}", entry.id)),
                }),
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(max_messages: usize) -> ReceiveRequest {
        ReceiveRequest {
            max_messages,
            wait_time: Duration::from_secs(1),
            visibility_timeout: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_receive_returns_oldest_first() {
        let queue = InMemoryQueue::new();
        for i in 0..12 {
            queue.publish(&json!({"event_id": format!("evt-{}", i)})).unwrap();
        }

        let batch = queue.receive_batch(&request(10)).await.unwrap();
        assert_eq!(batch.len(), 10);
        assert_eq!(
            event_schema::decode_body(&batch[0].body).unwrap(),
            json!({"event_id": "evt-0"})
        );

        // zero visibility timeout: nothing is hidden
        let again = queue.receive_batch(&request(10)).await.unwrap();
        assert_eq!(again, batch);
    }

    #[tokio::test]
    async fn test_visibility_timeout_hides_received_messages() {
        let queue = InMemoryQueue::new();
        for i in 0..3 {
            queue.publish(&json!({"event_id": format!("evt-{}", i)})).unwrap();
        }

        let hidden = ReceiveRequest {
            visibility_timeout: Duration::from_secs(30),
            ..request(2)
        };
        let first = queue.receive_batch(&hidden).await.unwrap();
        let second = queue.receive_batch(&hidden).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 1);
        assert!(queue.receive_batch(&hidden).await.unwrap().is_empty());
        assert_eq!(queue.len(), 3);

        queue.expire_visibility().unwrap();
        let visible = queue.receive_batch(&request(10)).await.unwrap();
        assert_eq!(visible.len(), 3);
        assert_eq!(visible[0], first[0]);
    }

    #[tokio::test]
    async fn test_delete_removes_only_that_delivery() {
        let queue = InMemoryQueue::new();
        let id = queue.publish(&json!({"event_id": "evt-1"})).unwrap();
        queue.redeliver(&id).unwrap();
        assert_eq!(queue.len(), 2);

        let batch = queue.receive_batch(&request(10)).await.unwrap();
        let outcome = queue
            .delete_batch(&[DeleteEntry::from(&batch[0])])
            .await
            .unwrap();

        assert_eq!(outcome.deleted, 1);
        assert!(outcome.failed.is_empty());
        assert_eq!(queue.len(), 1);

        let remaining = queue.receive_batch(&request(10)).await.unwrap();
        assert_eq!(remaining[0].message_id, id);
        assert_ne!(remaining[0].receipt_handle, batch[0].receipt_handle);
    }

    #[tokio::test]
    async fn test_rejected_delete_is_reported() {
        let queue = InMemoryQueue::new();
        let id = queue.send_body("{}").unwrap();
        queue.reject_deletes_for(&id).unwrap();

        let batch = queue.receive_batch(&request(1)).await.unwrap();
        let outcome = queue
            .delete_batch(&[DeleteEntry::from(&batch[0])])
            .await
            .unwrap();

        assert_eq!(outcome.deleted, 0);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].code, "ReceiptHandleIsInvalid");
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_rejects_oversized_batch() {
        let queue = InMemoryQueue::new();
        let entries: Vec<DeleteEntry> = (0..11)
            .map(|i| DeleteEntry {
                id: format!("m-{}", i),
                receipt_handle: format!("r-{}", i),
            })
            .collect();

        assert!(matches!(
            queue.delete_batch(&entries).await,
            Err(ConsumerError::Queue(_))
        ));
    }
}
