use prometheus::{IntCounter, Opts};
use tracing::warn;

#[derive(Clone)]
pub struct ConsumerMetrics {
    pub messages_received: IntCounter,
    pub duplicates: IntCounter,
    pub malformed: IntCounter,
    pub events_dispatched: IntCounter,
    pub batches_dispatched: IntCounter,
    pub delete_failures: IntCounter,
}

fn counter(name: &str, help: &str, service: &str) -> IntCounter {
    IntCounter::with_opts(Opts::new(name, help).const_label("service", service.to_string()))
        .expect("valid metric opts for analytics consumer counter")
}

impl ConsumerMetrics {
    pub fn new(service: &str) -> Self {
        let registry = prometheus::default_registry();

        let messages_received = counter(
            "analytics_consumer_messages_received_total",
            "Total number of messages received from the queue",
            service,
        );
        let duplicates = counter(
            "analytics_consumer_duplicates_total",
            "Messages discarded because their id was already seen in the run",
            service,
        );
        let malformed = counter(
            "analytics_consumer_malformed_total",
            "Messages whose envelope or payload could not be decoded",
            service,
        );
        let events_dispatched = counter(
            "analytics_consumer_events_dispatched_total",
            "Total number of events handed to the worker",
            service,
        );
        let batches_dispatched = counter(
            "analytics_consumer_batches_dispatched_total",
            "Total number of worker invocations",
            service,
        );
        let delete_failures = counter(
            "analytics_consumer_delete_failures_total",
            "Bulk delete entries rejected by the queue",
            service,
        );

        for metric in [
            Box::new(messages_received.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(duplicates.clone()),
            Box::new(malformed.clone()),
            Box::new(events_dispatched.clone()),
            Box::new(batches_dispatched.clone()),
            Box::new(delete_failures.clone()),
        ] {
            if let Err(e) = registry.register(metric) {
                warn!("Failed to register consumer metric: {}", e);
            }
        }

        Self {
            messages_received,
            duplicates,
            malformed,
            events_dispatched,
            batches_dispatched,
            delete_failures,
        }
    }
}
