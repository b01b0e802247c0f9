use actix_web::{web, App, HttpServer};
use analytics_worker::handlers::{self, AppState};
use analytics_worker::{EventWorker, PgEventStore, WorkerConfig, WorkerMetrics, SERVICE_NAME};
use anyhow::{Context, Result};
use db_pool::MeteredPool;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Request body limit for `/invoke`; consumer batches are at most ten events
const MAX_PAYLOAD_BYTES: usize = 256 * 1024;

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,actix_web=info,analytics_worker=debug".into());

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[actix_web::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    tracing::info!("Starting {}", SERVICE_NAME);

    let config = WorkerConfig::from_env().context("Failed to load worker configuration")?;
    config.db.log_config();

    let db_pool = MeteredPool::connect(&config.db)
        .await
        .context("Failed to create database pool")?;

    if config.run_migrations {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(db_pool.pg())
            .await
            .context("Failed to run migrations")?;
        tracing::info!("Migrations completed successfully");
    } else {
        tracing::info!("RUN_MIGRATIONS disabled, skipping migrations");
    }

    let mut store = PgEventStore::new(db_pool, config.table_name.clone())
        .context("Failed to create event store")?;
    store
        .verify_table()
        .await
        .context("Event table check failed")?;
    if let Some(timeout) = config.statement_timeout {
        store = store.with_statement_timeout(timeout);
    }

    tracing::info!(
        table = %store.table(),
        statement_timeout_ms = config.statement_timeout.map(|t| t.as_millis() as u64),
        "Event store ready"
    );

    let worker = EventWorker::new(Arc::new(store)).with_metrics(WorkerMetrics::new(SERVICE_NAME));
    let state = web::Data::new(AppState::new(worker));

    let http_port = config.http_port;
    tracing::info!("Starting HTTP server on 0.0.0.0:{}", http_port);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(web::JsonConfig::default().limit(MAX_PAYLOAD_BYTES))
            .configure(handlers::configure)
    })
    .bind(("0.0.0.0", http_port))
    .context("Failed to bind HTTP server")?
    .run()
    .await
    .context("HTTP server error")
}
