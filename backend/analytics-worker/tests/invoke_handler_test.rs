use actix_web::{test, web, App};
use analytics_worker::handlers::{self, AppState, INVOCATION_TYPE_HEADER};
use analytics_worker::{EventWorker, InMemoryEventStore, ProcessSummary};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn event(event_id: &str) -> Value {
    json!({
        "event_id": event_id,
        "event_timestamp": "2024-03-01T12:00:00Z",
        "event_type": "tap",
        "event_version": "1.0",
        "app_title": "nova-web",
        "app_version": "3.1.0",
        "user_id": "u-7",
        "user_name": "tester"
    })
}

fn state(store: Arc<InMemoryEventStore>) -> web::Data<AppState> {
    web::Data::new(AppState::new(EventWorker::new(store)))
}

#[actix_rt::test]
async fn test_sync_invoke_returns_summary() {
    let store = Arc::new(InMemoryEventStore::new());
    let app = test::init_service(
        App::new()
            .app_data(state(store.clone()))
            .configure(handlers::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/invoke")
        .set_json(json!([event("evt-1"), {"event_id": "broken"}, event("evt-2")]))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 200);

    let summary: ProcessSummary = test::read_body_json(resp).await;
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.inserted, 2);
    assert_eq!(store.len(), 2);
}

#[actix_rt::test]
async fn test_event_invoke_accepts_then_processes() {
    let store = Arc::new(InMemoryEventStore::new());
    let app = test::init_service(
        App::new()
            .app_data(state(store.clone()))
            .configure(handlers::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/invoke")
        .insert_header((INVOCATION_TYPE_HEADER, "Event"))
        .set_json(json!([event("evt-a"), event("evt-b"), event("evt-c")]))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 202);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({"status": "accepted", "received": 3}));

    for _ in 0..50 {
        if store.len() == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(store.len(), 3);
}

#[actix_rt::test]
async fn test_non_array_body_is_rejected() {
    let store = Arc::new(InMemoryEventStore::new());
    let app = test::init_service(
        App::new()
            .app_data(state(store.clone()))
            .configure(handlers::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/invoke")
        .set_json(event("evt-1"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 400);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], 400);
    assert!(store.is_empty());
}

#[actix_rt::test]
async fn test_health_and_metrics_endpoints() {
    let store = Arc::new(InMemoryEventStore::new());
    let app = test::init_service(
        App::new()
            .app_data(state(store))
            .configure(handlers::configure),
    )
    .await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert!(resp.status().is_success());
    assert_eq!(test::read_body(resp).await, web::Bytes::from_static(b"OK"));

    let resp = test::call_service(&app, test::TestRequest::get().uri("/ready").to_request()).await;
    assert_eq!(test::read_body(resp).await, web::Bytes::from_static(b"READY"));

    let resp =
        test::call_service(&app, test::TestRequest::get().uri("/metrics").to_request()).await;
    assert!(resp.status().is_success());
}
