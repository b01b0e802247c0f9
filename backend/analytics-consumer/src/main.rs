use actix_web::{App, HttpServer};
use analytics_consumer::http;
use analytics_consumer::{
    AppConfig, ConsumerMetrics, DeadlineBudget, EventConsumer, HttpInvoker, LambdaInvoker,
    RunSummary, SqsQueue, WorkerInvoker, WorkerTarget, SERVICE_NAME,
};
use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,analytics_consumer=debug".into());

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

async fn run_once(consumer: &EventConsumer, time_budget: Duration) -> Result<RunSummary> {
    let budget = DeadlineBudget::new(time_budget);
    let summary = consumer.run(&budget).await.context("Consumer run failed")?;
    Ok(summary)
}

#[actix_web::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    tracing::info!("Starting {}", SERVICE_NAME);

    let config = AppConfig::from_env().context("Failed to load consumer configuration")?;
    let aws_config = aws_config::load_defaults(BehaviorVersion::latest()).await;

    let queue = Arc::new(SqsQueue::new(
        aws_sdk_sqs::Client::new(&aws_config),
        config.queue_url.clone(),
    ));

    let invoker: Arc<dyn WorkerInvoker> = match &config.worker {
        WorkerTarget::Lambda { function } => {
            tracing::info!(function = %function, "Dispatching to worker Lambda");
            Arc::new(LambdaInvoker::new(
                aws_sdk_lambda::Client::new(&aws_config),
                function.clone(),
            ))
        }
        WorkerTarget::Http { url } => {
            let invoker = HttpInvoker::new(url, config.http_timeout)
                .context("Failed to create HTTP worker invoker")?;
            tracing::info!(endpoint = %invoker.endpoint(), "Dispatching to worker over HTTP");
            Arc::new(invoker)
        }
    };

    let consumer = EventConsumer::new(queue, invoker, config.consumer)
        .context("Invalid consumer configuration")?
        .with_metrics(ConsumerMetrics::new(SERVICE_NAME));

    tracing::info!(
        queue_url = %config.queue_url,
        batch_size = config.consumer.batch_size,
        time_budget_secs = config.time_budget.as_secs(),
        "Consumer configured"
    );

    let Some(interval) = config.schedule else {
        let summary = run_once(&consumer, config.time_budget).await?;
        println!("{}", serde_json::to_string(&summary)?);
        return Ok(());
    };

    tracing::info!(interval_secs = interval.as_secs(), "Running on a schedule");

    let metrics_server = match config.metrics_port {
        Some(port) => {
            let server = HttpServer::new(|| App::new().configure(http::configure))
                .workers(1)
                .disable_signals()
                .bind(("0.0.0.0", port))
                .context("Failed to bind metrics listener")?
                .run();
            let handle = server.handle();
            actix_web::rt::spawn(server);
            tracing::info!("Serving metrics on 0.0.0.0:{}", port);
            Some(handle)
        }
        None => None,
    };

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match run_once(&consumer, config.time_budget).await {
                    Ok(summary) => tracing::info!(processed = summary.processed, "Scheduled run completed"),
                    Err(e) => tracing::error!("Scheduled run failed: {:#}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received, stopping scheduler");
                break;
            }
        }
    }

    if let Some(handle) = metrics_server {
        handle.stop(true).await;
    }

    Ok(())
}
