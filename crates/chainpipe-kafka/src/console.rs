//! Producer that prints records instead of sending them.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::record::{DeliveryCallback, KafkaError, Record, RecordProducer};

/// Logs every record at `info` and reports it delivered right away.
#[derive(Debug, Default)]
pub struct ConsoleProducer {
    pretty: bool,
}

impl ConsoleProducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretty-print JSON payloads.
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    fn render(&self, value: &[u8]) -> String {
        match serde_json::from_slice::<Value>(value) {
            Ok(json) if self.pretty => {
                serde_json::to_string_pretty(&json).unwrap_or_else(|_| json.to_string())
            }
            Ok(json) => json.to_string(),
            Err(_) => String::from_utf8_lossy(value).into_owned(),
        }
    }
}

#[async_trait]
impl RecordProducer for ConsoleProducer {
    fn produce(&self, record: Record, on_delivery: DeliveryCallback) -> Result<(), KafkaError> {
        info!(
            topic = %record.topic,
            key = %record.key,
            partition = ?record.partition,
            "{}",
            self.render(&record.value)
        );
        on_delivery(Ok(()));
        Ok(())
    }

    async fn flush(&self, _timeout: Duration) -> Result<(), KafkaError> {
        Ok(())
    }

    fn close(&self) {
        debug!("console producer closed");
    }
}
