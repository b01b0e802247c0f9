use prometheus::{Histogram, HistogramOpts, IntCounterVec, IntGaugeVec, Opts};
use sqlx::PgPool;
use std::time::Duration;
use tracing::warn;

/// Pool occupancy and acquisition metrics, labelled with the owning service
#[derive(Clone)]
pub struct PoolMetrics {
    /// Connections by state: `idle`, `in_use`, `max`
    pub connections: IntGaugeVec,
    pub acquire_duration_seconds: Histogram,
    /// Failed acquisitions by kind: `timeout`, `closed`, `other`
    pub acquire_errors: IntCounterVec,
}

impl PoolMetrics {
    pub fn new(service: &str) -> Self {
        let registry = prometheus::default_registry();

        let connections = IntGaugeVec::new(
            Opts::new(
                "analytics_db_pool_connections",
                "Database pool connections by state",
            )
            .const_label("service", service.to_string()),
            &["state"],
        )
        .expect("valid metric opts for analytics_db_pool_connections");

        let acquire_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "analytics_db_pool_acquire_duration_seconds",
                "Time spent waiting for a pooled connection",
            )
            .const_label("service", service.to_string())
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]),
        )
        .expect("valid metric opts for analytics_db_pool_acquire_duration_seconds");

        let acquire_errors = IntCounterVec::new(
            Opts::new(
                "analytics_db_pool_acquire_errors_total",
                "Failed connection acquisitions by kind",
            )
            .const_label("service", service.to_string()),
            &["kind"],
        )
        .expect("valid metric opts for analytics_db_pool_acquire_errors_total");

        for metric in [
            Box::new(connections.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(acquire_duration_seconds.clone()),
            Box::new(acquire_errors.clone()),
        ] {
            if let Err(e) = registry.register(metric) {
                warn!("Failed to register pool metric: {}", e);
            }
        }

        Self {
            connections,
            acquire_duration_seconds,
            acquire_errors,
        }
    }

    pub(crate) fn observe_acquire(&self, elapsed: Duration, error: Option<&sqlx::Error>) {
        self.acquire_duration_seconds
            .observe(elapsed.as_secs_f64());

        if let Some(e) = error {
            self.acquire_errors
                .with_label_values(&[acquire_error_kind(e)])
                .inc();
        }
    }

    pub(crate) fn record_occupancy(&self, pool: &PgPool) {
        let size = i64::from(pool.size());
        let idle = pool.num_idle() as i64;

        self.connections.with_label_values(&["idle"]).set(idle);
        self.connections
            .with_label_values(&["in_use"])
            .set((size - idle).max(0));
        self.connections
            .with_label_values(&["max"])
            .set(i64::from(pool.options().get_max_connections()));
    }
}

fn acquire_error_kind(error: &sqlx::Error) -> &'static str {
    match error {
        sqlx::Error::PoolTimedOut => "timeout",
        sqlx::Error::PoolClosed => "closed",
        _ => "other",
    }
}
