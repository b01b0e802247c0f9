//! Fire-and-forget worker invocation
//!
//! An invoker returns once the worker has accepted the batch. Processing
//! results are never observed by the consumer.

use async_trait::async_trait;
use aws_sdk_lambda::error::DisplayErrorContext;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::InvocationType;
use aws_sdk_lambda::Client as LambdaClient;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::error::{ConsumerError, ConsumerResult};

/// Header carrying the invocation style for the HTTP transport
pub const INVOCATION_TYPE_HEADER: &str = "X-Invocation-Type";

#[async_trait]
pub trait WorkerInvoker: Send + Sync {
    /// Hand a batch of decoded event records to the worker without waiting
    /// for it to be processed
    async fn invoke_async(&self, batch: &[Value]) -> ConsumerResult<()>;
}

/// Invokes the worker Lambda function with invocation type `Event`
#[derive(Clone)]
pub struct LambdaInvoker {
    client: LambdaClient,
    function_name: String,
}

impl LambdaInvoker {
    pub fn new(client: LambdaClient, function_name: impl Into<String>) -> Self {
        Self {
            client,
            function_name: function_name.into(),
        }
    }
}

#[async_trait]
impl WorkerInvoker for LambdaInvoker {
    async fn invoke_async(&self, batch: &[Value]) -> ConsumerResult<()> {
        let payload = serde_json::to_vec(batch)?;
        let payload_bytes = payload.len();

        let output = self
            .client
            .invoke()
            .function_name(&self.function_name)
            .invocation_type(InvocationType::Event)
            .payload(Blob::new(payload))
            .send()
            .await
            .map_err(|e| {
                ConsumerError::Dispatch(format!(
                    "invoke {} failed: {}",
                    self.function_name,
                    DisplayErrorContext(&e)
                ))
            })?;

        // Asynchronous invocations are acknowledged with 202
        if output.status_code() != 202 {
            return Err(ConsumerError::Dispatch(format!(
                "invoke {} returned status {}",
                self.function_name,
                output.status_code()
            )));
        }

        debug!(
            function = %self.function_name,
            records = batch.len(),
            payload_bytes = payload_bytes,
            "Worker invoked"
        );
        Ok(())
    }
}

/// Posts batches to a worker's `/invoke` endpoint
#[derive(Clone)]
pub struct HttpInvoker {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpInvoker {
    pub fn new(base_url: &str, timeout: Duration) -> ConsumerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConsumerError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/invoke", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl WorkerInvoker for HttpInvoker {
    async fn invoke_async(&self, batch: &[Value]) -> ConsumerResult<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(INVOCATION_TYPE_HEADER, "Event")
            .json(batch)
            .send()
            .await
            .map_err(|e| {
                ConsumerError::Dispatch(format!("POST {} failed: {}", self.endpoint, e))
            })?;

        let status = response.status();
        if status != StatusCode::ACCEPTED {
            let body = response.text().await.unwrap_or_default();
            return Err(ConsumerError::Dispatch(format!(
                "POST {} returned {}: {}",
                self.endpoint, status, body
            )));
        }

        debug!(endpoint = %self.endpoint, records = batch.len(), "Worker accepted batch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_endpoint_normalizes_trailing_slash() {
        let invoker = HttpInvoker::new("http://worker:8000/", Duration::from_secs(5)).unwrap();
        assert_eq!(invoker.endpoint(), "http://worker:8000/invoke");

        let invoker = HttpInvoker::new("http://worker:8000", Duration::from_secs(5)).unwrap();
        assert_eq!(invoker.endpoint(), "http://worker:8000/invoke");
    }
}
