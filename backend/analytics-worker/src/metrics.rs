use prometheus::{Histogram, HistogramOpts, IntCounter, Opts};
use tracing::warn;

#[derive(Clone)]
pub struct WorkerMetrics {
    pub events_received: IntCounter,
    pub events_inserted: IntCounter,
    pub events_skipped: IntCounter,
    pub batches_failed: IntCounter,
    pub batch_duration_seconds: Histogram,
}

impl WorkerMetrics {
    pub fn new(service: &str) -> Self {
        let registry = prometheus::default_registry();

        let events_received = IntCounter::with_opts(
            Opts::new(
                "analytics_worker_events_received_total",
                "Total number of records received in worker batches",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for analytics_worker_events_received_total");

        let events_inserted = IntCounter::with_opts(
            Opts::new(
                "analytics_worker_events_inserted_total",
                "Total number of event rows newly written to storage",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for analytics_worker_events_inserted_total");

        let events_skipped = IntCounter::with_opts(
            Opts::new(
                "analytics_worker_events_skipped_total",
                "Total number of records skipped as malformed",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for analytics_worker_events_skipped_total");

        let batches_failed = IntCounter::with_opts(
            Opts::new(
                "analytics_worker_batches_failed_total",
                "Total number of batches rolled back after a storage failure",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for analytics_worker_batches_failed_total");

        let batch_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "analytics_worker_batch_duration_seconds",
                "Time spent normalizing and storing one batch",
            )
            .const_label("service", service.to_string())
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        )
        .expect("valid metric opts for analytics_worker_batch_duration_seconds");

        for metric in [
            Box::new(events_received.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(events_inserted.clone()),
            Box::new(events_skipped.clone()),
            Box::new(batches_failed.clone()),
            Box::new(batch_duration_seconds.clone()),
        ] {
            if let Err(e) = registry.register(metric) {
                warn!("Failed to register worker metric: {}", e);
            }
        }

        Self {
            events_received,
            events_inserted,
            events_skipped,
            batches_failed,
            batch_duration_seconds,
        }
    }
}
