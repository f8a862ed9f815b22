//! Broker connection settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Kafka connection and publishing options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    /// Bootstrap brokers, `host:port`.
    pub seeds: Vec<String>,
    /// SASL/PLAIN user. Empty = plaintext, no authentication.
    pub user: String,
    pub password: String,
    /// Partition count of the target topics. When set, the partition is
    /// `height mod partitions`; otherwise the broker hashes the key.
    pub partitions: Option<i32>,
    /// Upper bound for the final flush on shutdown (milliseconds).
    pub flush_timeout_ms: u64,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            seeds: Vec::new(),
            user: String::new(),
            password: String::new(),
            partitions: None,
            flush_timeout_ms: 10_000,
        }
    }
}

impl KafkaConfig {
    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }

    pub fn uses_sasl(&self) -> bool {
        !self.user.is_empty()
    }
}
