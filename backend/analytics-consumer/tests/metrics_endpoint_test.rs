use actix_web::{test, App};
use analytics_consumer::{
    http, ConsumerConfig, ConsumerMetrics, ConsumerResult, DeadlineBudget, EventConsumer,
    InMemoryQueue, WorkerInvoker, SERVICE_NAME,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

struct AcceptingInvoker;

#[async_trait]
impl WorkerInvoker for AcceptingInvoker {
    async fn invoke_async(&self, _batch: &[Value]) -> ConsumerResult<()> {
        Ok(())
    }
}

#[actix_rt::test]
async fn test_run_counters_are_served_on_metrics_route() {
    let queue = Arc::new(InMemoryQueue::new());
    queue.publish(&json!({"event_id": "evt-1"})).unwrap();
    queue.publish(&json!({"event_id": "evt-2"})).unwrap();
    queue.send_body("not an envelope").unwrap();

    let consumer = EventConsumer::new(
        queue.clone(),
        Arc::new(AcceptingInvoker),
        ConsumerConfig::default(),
    )
    .unwrap()
    .with_metrics(ConsumerMetrics::new(SERVICE_NAME));

    consumer
        .run(&DeadlineBudget::new(Duration::from_secs(300)))
        .await
        .unwrap();

    let app = test::init_service(App::new().configure(http::configure)).await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert!(resp.status().is_success());

    let resp =
        test::call_service(&app, test::TestRequest::get().uri("/metrics").to_request()).await;
    assert!(resp.status().is_success());

    let body = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
    assert!(body.contains(
        r#"analytics_consumer_events_dispatched_total{service="analytics-consumer"} 2"#
    ));
    assert!(body.contains(r#"analytics_consumer_batches_dispatched_total{service="analytics-consumer"} 1"#));
    assert!(body.contains(r#"analytics_consumer_malformed_total{service="analytics-consumer"} 1"#));
}
