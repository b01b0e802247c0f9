//! Queue → consumer → worker → store, all in process

use analytics_consumer::{
    ConsumerConfig, ConsumerError, ConsumerResult, DeadlineBudget, EventConsumer, InMemoryQueue,
    WorkerInvoker,
};
use analytics_worker::{EventWorker, InMemoryEventStore, ProcessSummary};
use async_trait::async_trait;
use event_schema::AnalyticsEvent;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Hands batches straight to an in-process worker
struct InProcessInvoker {
    worker: EventWorker,
    summaries: Mutex<Vec<ProcessSummary>>,
}

impl InProcessInvoker {
    fn new(store: Arc<InMemoryEventStore>) -> Self {
        Self {
            worker: EventWorker::new(store),
            summaries: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl WorkerInvoker for InProcessInvoker {
    async fn invoke_async(&self, batch: &[Value]) -> ConsumerResult<()> {
        let summary = self
            .worker
            .process(batch)
            .await
            .map_err(|e| ConsumerError::Dispatch(e.to_string()))?;
        self.summaries.lock().unwrap().push(summary);
        Ok(())
    }
}

fn app_event(event_type: &str) -> AnalyticsEvent {
    AnalyticsEvent::new(event_type, "nova-ios", "2.4.0", "u-42", "tester")
        .with_meta(json!({"screen": "feed"}))
}

#[tokio::test]
async fn test_events_flow_from_queue_to_store() {
    let queue = Arc::new(InMemoryQueue::new());
    let store = Arc::new(InMemoryEventStore::new());
    let invoker = Arc::new(InProcessInvoker::new(store.clone()));

    let events: Vec<AnalyticsEvent> = (0..15).map(|i| app_event(&format!("view_{}", i))).collect();
    for e in &events {
        queue.publish(e).unwrap();
    }
    queue.publish(&json!({"event_id": "incomplete"})).unwrap();

    let consumer =
        EventConsumer::new(queue.clone(), invoker.clone(), ConsumerConfig::default()).unwrap();
    let summary = consumer
        .run(&DeadlineBudget::new(Duration::from_secs(300)))
        .await
        .unwrap();

    assert_eq!(summary.processed, 16);
    assert_eq!(summary.batches, 2);
    assert!(queue.is_empty());

    let rows = store.rows();
    assert_eq!(rows.len(), 15);
    assert_eq!(rows[0].event_id, events[0].event_id);
    assert_eq!(rows[0].meta, r#"{"screen":"feed"}"#);
    assert_eq!(rows[14].event_type, "view_14");

    let skipped: usize = invoker.summaries.lock().unwrap().iter().map(|s| s.skipped).sum();
    assert_eq!(skipped, 1);
}

#[tokio::test]
async fn test_replayed_events_are_stored_once() {
    let queue = Arc::new(InMemoryQueue::new());
    let store = Arc::new(InMemoryEventStore::new());
    let invoker = Arc::new(InProcessInvoker::new(store.clone()));

    let event = app_event("purchase");
    let consumer =
        EventConsumer::new(queue.clone(), invoker.clone(), ConsumerConfig::default()).unwrap();

    // the same event published twice, consumed by separate runs
    for _ in 0..2 {
        queue.publish(&event).unwrap();
        consumer
            .run(&DeadlineBudget::new(Duration::from_secs(300)))
            .await
            .unwrap();
    }

    assert_eq!(store.len(), 1);
    let inserted: Vec<u64> = invoker
        .summaries
        .lock()
        .unwrap()
        .iter()
        .map(|s| s.inserted)
        .collect();
    assert_eq!(inserted, vec![1, 0]);
}
