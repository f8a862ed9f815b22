//! Records and the producer abstraction behind the streaming client.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by a [`RecordProducer`].
#[derive(Debug, Error)]
pub enum KafkaError {
    #[error("producer configuration error: {0}")]
    Config(String),

    #[error("failed to enqueue record for topic {topic}: {reason}")]
    Produce { topic: String, reason: String },

    #[error("flush did not complete: {0}")]
    Flush(String),
}

/// One broker record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub topic: String,
    /// Decimal block height. Same key ⇒ same partition.
    pub key: String,
    pub value: Vec<u8>,
    /// Explicit partition, when the client is configured with a partition count.
    pub partition: Option<i32>,
}

/// Final outcome of an asynchronous send.
pub type DeliveryOutcome = Result<(), String>;

/// Invoked exactly once when the broker acknowledges or rejects a record.
pub type DeliveryCallback = Box<dyn FnOnce(DeliveryOutcome) + Send + Sync>;

/// Low-level, fire-and-forget record producer.
#[async_trait]
pub trait RecordProducer: Send + Sync {
    /// Enqueue `record` and return without waiting for delivery.
    ///
    /// An error means the record was never queued; `on_delivery` is dropped
    /// without being called in that case.
    fn produce(&self, record: Record, on_delivery: DeliveryCallback) -> Result<(), KafkaError>;

    /// Wait up to `timeout` for every queued record to be delivered.
    async fn flush(&self, timeout: Duration) -> Result<(), KafkaError>;

    /// Release the connection. Records still queued may be lost.
    fn close(&self);
}
