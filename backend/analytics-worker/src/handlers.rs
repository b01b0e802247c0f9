//! HTTP surface of the worker
//!
//! `POST /invoke` mirrors the two invocation styles of the queue consumer:
//! `X-Invocation-Type: Event` acknowledges with 202 and processes the batch in
//! the background, anything else processes inline and returns the summary.

use actix_web::{web, HttpRequest, HttpResponse};
use prometheus::{Encoder, TextEncoder};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error};

use crate::error::{WorkerError, WorkerResult};
use crate::worker::EventWorker;

pub const INVOCATION_TYPE_HEADER: &str = "X-Invocation-Type";
pub const EVENT_INVOCATION: &str = "Event";

#[derive(Clone)]
pub struct AppState {
    pub worker: Arc<EventWorker>,
}

impl AppState {
    pub fn new(worker: EventWorker) -> Self {
        Self {
            worker: Arc::new(worker),
        }
    }
}

fn is_event_invocation(req: &HttpRequest) -> bool {
    req.headers()
        .get(INVOCATION_TYPE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().eq_ignore_ascii_case(EVENT_INVOCATION))
        .unwrap_or(false)
}

/// POST /invoke
pub async fn invoke(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<Value>,
) -> WorkerResult<HttpResponse> {
    let batch = match body.into_inner() {
        Value::Array(records) => records,
        other => {
            return Err(WorkerError::Validation(format!(
                "Expected a JSON array of event records, got {}",
                json_kind(&other)
            )))
        }
    };

    if is_event_invocation(&req) {
        let received = batch.len();
        let worker = Arc::clone(&state.worker);

        tokio::spawn(async move {
            if let Err(e) = worker.process(&batch).await {
                error!(records = batch.len(), error = %e, "Asynchronous batch failed");
            }
        });

        debug!(received = received, "Accepted batch for asynchronous processing");
        return Ok(HttpResponse::Accepted().json(json!({
            "status": "accepted",
            "received": received,
        })));
    }

    let summary = state.worker.process(&batch).await?;
    Ok(HttpResponse::Ok().json(summary))
}

/// GET /health
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}

/// GET /ready
pub async fn ready() -> HttpResponse {
    HttpResponse::Ok().body("READY")
}

/// GET /metrics
pub async fn metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return HttpResponse::InternalServerError().body(e.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/invoke", web::post().to(invoke))
        .route("/health", web::get().to(health))
        .route("/ready", web::get().to(ready))
        .route("/metrics", web::get().to(metrics));
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
