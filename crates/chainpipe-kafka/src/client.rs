//! Height-keyed streaming client.

use std::time::Duration;

use async_trait::async_trait;

use chainpipe_core::broker::StreamingClient;
use chainpipe_core::error::PipelineError;
use chainpipe_core::router::TopicRouter;

use crate::config::KafkaConfig;
use crate::record::{DeliveryCallback, DeliveryOutcome, Record, RecordProducer};

/// Default bound for the final flush.
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// [`StreamingClient`] over any [`RecordProducer`].
///
/// Every record of one height carries the same key (the decimal height), so
/// all messages of a block land on the same partition.
pub struct KafkaStreamingClient<P: RecordProducer> {
    producer: P,
    router: TopicRouter,
    partitions: Option<i32>,
    flush_timeout: Duration,
}

impl<P: RecordProducer> KafkaStreamingClient<P> {
    pub fn new(producer: P, router: TopicRouter) -> Self {
        Self {
            producer,
            router,
            partitions: None,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
        }
    }

    /// Apply partitioning and flush settings from `config`.
    pub fn with_config(mut self, config: &KafkaConfig) -> Self {
        self.partitions = config.partitions.filter(|n| *n > 0);
        self.flush_timeout = config.flush_timeout();
        self
    }

    /// Pin heights to `height mod partitions`.
    pub fn with_partitions(mut self, partitions: i32) -> Self {
        self.partitions = (partitions > 0).then_some(partitions);
        self
    }

    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }

    pub fn producer(&self) -> &P {
        &self.producer
    }

    pub fn router(&self) -> &TopicRouter {
        &self.router
    }

    /// Partition for `height`, when a partition count is configured.
    pub fn partition_for(&self, height: i64) -> Option<i32> {
        self.partitions
            .map(|n| height.rem_euclid(i64::from(n)) as i32)
    }
}

fn delivery_logger(topic: String, key: String) -> DeliveryCallback {
    Box::new(move |outcome: DeliveryOutcome| match outcome {
        Ok(()) => tracing::debug!(%topic, height = %key, "message delivered"),
        Err(e) => tracing::warn!(%topic, height = %key, error = %e, "failed to deliver message"),
    })
}

#[async_trait]
impl<P: RecordProducer> StreamingClient for KafkaStreamingClient<P> {
    async fn publish_async(
        &self,
        type_name: &str,
        message: Vec<u8>,
        block_height: i64,
    ) -> Result<(), PipelineError> {
        let topic = self.router.resolve_topic(type_name)?.to_string();
        let record = Record {
            key: block_height.to_string(),
            value: message,
            partition: self.partition_for(block_height),
            topic: topic.clone(),
        };
        let callback = delivery_logger(topic, record.key.clone());
        self.producer
            .produce(record, callback)
            .map_err(|e| PipelineError::Publish(e.to_string()))
    }

    async fn close(&self) -> Result<(), PipelineError> {
        if let Err(e) = self.producer.flush(self.flush_timeout).await {
            tracing::warn!(error = %e, "flush before close did not complete");
        }
        self.producer.close();
        tracing::info!("streaming client closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use chainpipe_core::error::RoutingError;
    use chainpipe_core::router::TopicRoute;

    use crate::memory::MemoryProducer;

    fn router() -> TopicRouter {
        TopicRouter::from_routes(&[
            TopicRoute {
                name: "domain-event.input.allora.emissions".into(),
                types: vec!["emissions.v3.EventScoresSet".into()],
            },
            TopicRoute {
                name: "domain-event.input.allora.bank".into(),
                types: vec!["cosmos.bank.v1beta1.MsgSend".into()],
            },
        ])
    }

    #[tokio::test]
    async fn records_are_keyed_by_height() {
        let client = KafkaStreamingClient::new(MemoryProducer::new(), router());
        client
            .publish_async("/cosmos.bank.v1beta1.MsgSend", b"{}".to_vec(), 1_250_001)
            .await
            .unwrap();

        let records = client.producer().pending();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].topic, "domain-event.input.allora.bank");
        assert_eq!(records[0].key, "1250001");
        assert_eq!(records[0].partition, None);
    }

    #[tokio::test]
    async fn same_height_shares_a_partition() {
        let client = KafkaStreamingClient::new(MemoryProducer::new(), router()).with_partitions(6);
        for height in [100_i64, 100, 101, 100, 106] {
            for ty in ["emissions.v3.EventScoresSet", "cosmos.bank.v1beta1.MsgSend"] {
                client.publish_async(ty, b"{}".to_vec(), height).await.unwrap();
            }
        }

        let mut by_height: HashMap<String, Vec<Option<i32>>> = HashMap::new();
        for r in client.producer().pending() {
            by_height.entry(r.key.clone()).or_default().push(r.partition);
        }
        for (key, partitions) in &by_height {
            assert!(
                partitions.windows(2).all(|w| w[0] == w[1]),
                "height {key} spread over {partitions:?}"
            );
        }
        assert_eq!(by_height["100"][0], Some(4));
        assert_eq!(by_height["106"][0], by_height["100"][0]);
        assert_eq!(client.partition_for(-1), Some(5));
    }

    #[tokio::test]
    async fn unknown_type_is_rejected_synchronously() {
        let client = KafkaStreamingClient::new(MemoryProducer::new(), router());
        let err = client
            .publish_async("/x.y.Unknown", b"{}".to_vec(), 1)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Routing(RoutingError::UnknownType { .. })
        ));
        assert!(client.producer().pending().is_empty());
    }

    #[tokio::test]
    async fn delivery_failures_do_not_fail_publish() {
        let producer = MemoryProducer::new();
        producer.fail_deliveries(true);
        let client = KafkaStreamingClient::new(producer, router());

        client
            .publish_async("cosmos.bank.v1beta1.MsgSend", b"{}".to_vec(), 5)
            .await
            .unwrap();
        client.close().await.unwrap();

        assert_eq!(client.producer().failed().len(), 1);
        assert!(client.producer().delivered().is_empty());
        assert!(client.producer().is_closed());
    }

    #[tokio::test]
    async fn close_flushes_pending_records() {
        let client = KafkaStreamingClient::new(MemoryProducer::new(), router())
            .with_flush_timeout(Duration::from_millis(50));
        client
            .publish_async("emissions.v3.EventScoresSet", b"{}".to_vec(), 9)
            .await
            .unwrap();
        client.close().await.unwrap();
        assert_eq!(client.producer().delivered().len(), 1);
        assert!(client.producer().pending().is_empty());
    }

    #[tokio::test]
    async fn enqueue_failure_is_a_publish_error() {
        let producer = MemoryProducer::new();
        producer.close();
        let client = KafkaStreamingClient::new(producer, router());
        let err = client
            .publish_async("emissions.v3.EventScoresSet", b"{}".to_vec(), 9)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Publish(_)));
    }
}
