//! librdkafka-backed producer.
//!
//! Records are handed to a [`ThreadedProducer`]; its background thread polls
//! the delivery queue and invokes each record's callback from the delivery
//! report. Compression is snappy, `acks=all` with idempotence enabled. When a
//! user is configured the connection is SASL/PLAIN over TLS.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{BaseRecord, DeliveryResult, Producer, ProducerContext, ThreadedProducer};
use rdkafka::ClientContext;

use crate::config::KafkaConfig;
use crate::record::{DeliveryCallback, KafkaError, Record, RecordProducer};

/// Routes delivery reports to the callback attached to each record.
pub struct DeliveryContext;

impl ClientContext for DeliveryContext {}

impl ProducerContext for DeliveryContext {
    type DeliveryOpaque = Box<DeliveryCallback>;

    fn delivery(&self, result: &DeliveryResult<'_>, callback: Self::DeliveryOpaque) {
        match result {
            Ok(_) => callback(Ok(())),
            Err((e, _)) => callback(Err(e.to_string())),
        }
    }
}

type Inner = Arc<ThreadedProducer<DeliveryContext>>;

pub struct RdKafkaProducer {
    inner: Mutex<Option<Inner>>,
}

impl RdKafkaProducer {
    pub fn new(config: &KafkaConfig) -> Result<Self, KafkaError> {
        if config.seeds.is_empty() {
            return Err(KafkaError::Config("no seed brokers configured".into()));
        }

        let mut client = ClientConfig::new();
        client
            .set("bootstrap.servers", config.seeds.join(","))
            .set("compression.type", "snappy")
            .set("acks", "all")
            .set("enable.idempotence", "true");
        if config.uses_sasl() {
            client
                .set("security.protocol", "SASL_SSL")
                .set("sasl.mechanisms", "PLAIN")
                .set("sasl.username", &config.user)
                .set("sasl.password", &config.password);
        }

        let producer: ThreadedProducer<DeliveryContext> = client
            .create_with_context(DeliveryContext)
            .map_err(|e| KafkaError::Config(e.to_string()))?;

        tracing::info!(
            seeds = %config.seeds.join(","),
            sasl = config.uses_sasl(),
            "kafka producer created"
        );
        Ok(Self {
            inner: Mutex::new(Some(Arc::new(producer))),
        })
    }

    fn handle(&self) -> Option<Inner> {
        self.inner.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordProducer for RdKafkaProducer {
    fn produce(&self, record: Record, on_delivery: DeliveryCallback) -> Result<(), KafkaError> {
        let producer = self.handle().ok_or_else(|| KafkaError::Produce {
            topic: record.topic.clone(),
            reason: "producer is closed".into(),
        })?;

        let mut base = BaseRecord::with_opaque_to(&record.topic, Box::new(on_delivery))
            .key(record.key.as_str())
            .payload(record.value.as_slice());
        if let Some(partition) = record.partition {
            base = base.partition(partition);
        }

        producer.send(base).map_err(|(e, _)| KafkaError::Produce {
            topic: record.topic.clone(),
            reason: e.to_string(),
        })
    }

    async fn flush(&self, timeout: Duration) -> Result<(), KafkaError> {
        let Some(producer) = self.handle() else {
            return Ok(());
        };
        tokio::task::spawn_blocking(move || producer.flush(timeout))
            .await
            .map_err(|e| KafkaError::Flush(e.to_string()))?
            .map_err(|e| KafkaError::Flush(e.to_string()))
    }

    fn close(&self) {
        // Dropping the last handle stops the polling thread.
        if self.inner.lock().unwrap().take().is_some() {
            tracing::info!("kafka producer closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_seeds_is_a_config_error() {
        let err = RdKafkaProducer::new(&KafkaConfig::default()).err().unwrap();
        assert!(matches!(err, KafkaError::Config(_)));
    }

    #[tokio::test]
    async fn closed_producer_rejects_and_flushes_trivially() {
        let producer = RdKafkaProducer::new(&KafkaConfig {
            seeds: vec!["127.0.0.1:9092".into()],
            ..KafkaConfig::default()
        })
        .unwrap();
        producer.close();

        let err = producer
            .produce(
                Record {
                    topic: "t".into(),
                    key: "1".into(),
                    value: vec![],
                    partition: None,
                },
                Box::new(|_| {}),
            )
            .unwrap_err();
        assert!(matches!(err, KafkaError::Produce { .. }));
        producer.flush(Duration::from_millis(10)).await.unwrap();
    }
}
