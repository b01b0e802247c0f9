//! Metrics listener for scheduled mode

use actix_web::{web, HttpResponse};
use prometheus::{Encoder, TextEncoder};
use tracing::error;

/// GET /health
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}

/// GET /metrics
pub async fn metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return HttpResponse::InternalServerError().body(e.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/metrics", web::get().to(metrics));
}
