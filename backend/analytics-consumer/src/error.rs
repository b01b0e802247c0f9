use thiserror::Error;

pub type ConsumerResult<T> = std::result::Result<T, ConsumerError>;

#[derive(Debug, Error)]
pub enum ConsumerError {
    /// Receive or delete call against the queue failed
    #[error("Queue error: {0}")]
    Queue(String),

    /// Worker could not be invoked or did not accept the batch
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ConsumerError {
    /// Whether the messages of the failing batch are still in the queue
    pub fn leaves_messages_queued(&self) -> bool {
        matches!(self, ConsumerError::Dispatch(_) | ConsumerError::Serialization(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConsumerError::Dispatch("worker returned 500".into());
        assert_eq!(err.to_string(), "Dispatch error: worker returned 500");
        assert!(err.leaves_messages_queued());

        let err = ConsumerError::Queue("throttled".into());
        assert!(!err.leaves_messages_queued());
    }
}
