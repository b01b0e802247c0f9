use db_pool::env_utils::{env_non_empty, parse_env_checked};
use std::str::FromStr;
use std::time::Duration;

use crate::consumer::ConsumerConfig;
use crate::error::{ConsumerError, ConsumerResult};

pub const DEFAULT_TIME_BUDGET_SECS: u64 = 300;
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 5000;

/// Where dispatched batches go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerTarget {
    /// Lambda function name or ARN
    Lambda { function: String },
    /// Base URL of a worker HTTP service
    Http { url: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub queue_url: String,
    pub worker: WorkerTarget,
    pub consumer: ConsumerConfig,
    /// Length of one execution
    pub time_budget: Duration,
    /// Interval between executions; `None` runs once
    pub schedule: Option<Duration>,
    pub http_timeout: Duration,
    /// Port of the `/metrics` listener in scheduled mode; `None` disables it
    pub metrics_port: Option<u16>,
}

fn env_parse<T: FromStr>(key: &str, default: T) -> ConsumerResult<T> {
    parse_env_checked(key, default).map_err(ConsumerError::Config)
}

impl AppConfig {
    pub fn from_env() -> ConsumerResult<Self> {
        let queue_url = env_non_empty("SQS_URL")
            .ok_or_else(|| ConsumerError::Config("SQS_URL must be set".to_string()))?;

        let worker = match (env_non_empty("WORKER_LAMBDA_ARN"), env_non_empty("WORKER_URL")) {
            (Some(function), _) => WorkerTarget::Lambda { function },
            (None, Some(url)) => WorkerTarget::Http { url },
            (None, None) => {
                return Err(ConsumerError::Config(
                    "Either WORKER_LAMBDA_ARN or WORKER_URL must be set".to_string(),
                ))
            }
        };

        let defaults = ConsumerConfig::default();
        let consumer = ConsumerConfig {
            batch_size: env_parse("CONSUMER_BATCH_SIZE", defaults.batch_size)?,
            wait_time: Duration::from_secs(env_parse(
                "CONSUMER_WAIT_TIME_SECS",
                defaults.wait_time.as_secs(),
            )?),
            visibility_timeout: Duration::from_secs(env_parse(
                "CONSUMER_VISIBILITY_TIMEOUT_SECS",
                defaults.visibility_timeout.as_secs(),
            )?),
            safety_margin: Duration::from_millis(env_parse(
                "CONSUMER_SAFETY_MARGIN_MS",
                defaults.safety_margin.as_millis() as u64,
            )?),
        };
        consumer.validate()?;

        let schedule = match env_parse::<u64>("CONSUMER_SCHEDULE_SECS", 0)? {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(Self {
            queue_url,
            worker,
            consumer,
            time_budget: Duration::from_secs(env_parse(
                "CONSUMER_TIME_BUDGET_SECS",
                DEFAULT_TIME_BUDGET_SECS,
            )?),
            schedule,
            http_timeout: Duration::from_millis(env_parse(
                "WORKER_HTTP_TIMEOUT_MS",
                DEFAULT_HTTP_TIMEOUT_MS,
            )?),
            metrics_port: match env_parse::<u16>("CONSUMER_METRICS_PORT", 0)? {
                0 => None,
                port => Some(port),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: [&str; 11] = [
        "SQS_URL",
        "WORKER_LAMBDA_ARN",
        "WORKER_URL",
        "CONSUMER_BATCH_SIZE",
        "CONSUMER_WAIT_TIME_SECS",
        "CONSUMER_VISIBILITY_TIMEOUT_SECS",
        "CONSUMER_SAFETY_MARGIN_MS",
        "CONSUMER_TIME_BUDGET_SECS",
        "CONSUMER_SCHEDULE_SECS",
        "WORKER_HTTP_TIMEOUT_MS",
        "CONSUMER_METRICS_PORT",
    ];

    fn clear_env() {
        for key in KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_with_lambda_target() {
        clear_env();
        std::env::set_var("SQS_URL", "https://sqs.eu-central-1.amazonaws.com/123/analytics");
        std::env::set_var("WORKER_LAMBDA_ARN", "arn:aws:lambda:eu-central-1:123:function:worker");

        let config = AppConfig::from_env().unwrap();
        assert_eq!(
            config.worker,
            WorkerTarget::Lambda {
                function: "arn:aws:lambda:eu-central-1:123:function:worker".to_string()
            }
        );
        assert_eq!(config.consumer, ConsumerConfig::default());
        assert_eq!(config.time_budget, Duration::from_secs(300));
        assert_eq!(config.schedule, None);
        assert_eq!(config.http_timeout, Duration::from_millis(5000));
        assert_eq!(config.metrics_port, None);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_http_target_and_overrides() {
        clear_env();
        std::env::set_var("SQS_URL", "http://localhost:4566/000000000000/analytics");
        std::env::set_var("WORKER_URL", "http://worker:8000");
        std::env::set_var("CONSUMER_BATCH_SIZE", "5");
        std::env::set_var("CONSUMER_SAFETY_MARGIN_MS", "2000");
        std::env::set_var("CONSUMER_SCHEDULE_SECS", "60");
        std::env::set_var("CONSUMER_METRICS_PORT", "9464");

        let config = AppConfig::from_env().unwrap();
        assert_eq!(
            config.worker,
            WorkerTarget::Http {
                url: "http://worker:8000".to_string()
            }
        );
        assert_eq!(config.consumer.batch_size, 5);
        assert_eq!(config.consumer.safety_margin, Duration::from_secs(2));
        assert_eq!(config.schedule, Some(Duration::from_secs(60)));
        assert_eq!(config.metrics_port, Some(9464));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_missing_and_invalid_values() {
        clear_env();
        assert!(matches!(AppConfig::from_env(), Err(ConsumerError::Config(_))));

        std::env::set_var("SQS_URL", "http://localhost:4566/000000000000/analytics");
        assert!(matches!(AppConfig::from_env(), Err(ConsumerError::Config(_))));

        std::env::set_var("WORKER_URL", "http://worker:8000");
        std::env::set_var("CONSUMER_BATCH_SIZE", "25");
        assert!(matches!(AppConfig::from_env(), Err(ConsumerError::Config(_))));

        std::env::set_var("CONSUMER_BATCH_SIZE", "ten");
        assert!(matches!(AppConfig::from_env(), Err(ConsumerError::Config(_))));

        std::env::remove_var("CONSUMER_BATCH_SIZE");
        std::env::set_var("CONSUMER_METRICS_PORT", "70000");
        assert!(matches!(AppConfig::from_env(), Err(ConsumerError::Config(_))));

        clear_env();
    }
}
