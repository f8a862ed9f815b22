//! Fluent builder for stream pipelines.
//!
//! # Example
//!
//! ```rust,no_run
//! use chainpipe_core::builder::ProducerBuilder;
//! use chainpipe_core::pipeline::ExecutionMode;
//!
//! let config = ProducerBuilder::new()
//!     .start_height(1_250_000)
//!     .num_workers(8)
//!     .rate_limit_interval_ms(200)
//!     .mode(ExecutionMode::Parallel)
//!     .build_config();
//! ```

use std::sync::Arc;

use crate::checkpoint::{CheckpointManager, CheckpointStore, StreamKind};
use crate::client::ChainClient;
use crate::pipeline::{ExecutionMode, HeightPipeline, ProducerConfig, RetryBackoff};
use crate::processor::Processor;
use crate::producer::{EventsProducer, TransactionsProducer};

/// Fluent builder for `ProducerConfig` and the two stream pipelines.
#[derive(Default)]
pub struct ProducerBuilder {
    config: ProducerConfig,
}

impl ProducerBuilder {
    pub fn new() -> Self {
        Self {
            config: ProducerConfig::default(),
        }
    }

    /// Start from an existing configuration.
    pub fn from_config(config: ProducerConfig) -> Self {
        Self { config }
    }

    /// Set the first height (`0` = chain tip).
    pub fn start_height(mut self, height: i64) -> Self {
        self.config.start_height = height;
        self
    }

    /// Set the sleep after catching up with the tip.
    pub fn block_refresh_interval_ms(mut self, ms: u64) -> Self {
        self.config.block_refresh_interval_ms = ms;
        self
    }

    /// Set the pause after each processing attempt.
    pub fn rate_limit_interval_ms(mut self, ms: u64) -> Self {
        self.config.rate_limit_interval_ms = ms;
        self
    }

    pub fn num_workers(mut self, n: usize) -> Self {
        self.config.num_workers = n;
        self
    }

    pub fn queue_capacity(mut self, n: usize) -> Self {
        self.config.queue_capacity = n;
        self
    }

    /// Set how many tip polls bootstrap may use.
    pub fn bootstrap_attempts(mut self, n: u32) -> Self {
        self.config.bootstrap_attempts = n;
        self
    }

    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Start after the last checkpointed height when one exists.
    pub fn resume_from_checkpoint(mut self, resume: bool) -> Self {
        self.config.resume_from_checkpoint = resume;
        self
    }

    /// Back off exponentially after failures instead of the fixed pause.
    pub fn retry(mut self, backoff: RetryBackoff) -> Self {
        self.config.retry = Some(backoff);
        self
    }

    /// Give up on a height after `n` failed attempts.
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = Some(n);
        self
    }

    /// Build the `ProducerConfig`.
    pub fn build_config(self) -> ProducerConfig {
        self.config
    }

    /// Build the transactions pipeline.
    pub fn build_transactions(
        self,
        client: Arc<dyn ChainClient>,
        processor: Arc<Processor>,
        store: Arc<dyn CheckpointStore>,
    ) -> HeightPipeline<TransactionsProducer> {
        let checkpoint = CheckpointManager::new(store, StreamKind::Transactions);
        let producer = TransactionsProducer::new(client.clone(), processor, checkpoint.clone());
        HeightPipeline::new(client, Arc::new(producer), self.config).with_checkpoint(checkpoint)
    }

    /// Build the events pipeline.
    pub fn build_events(
        self,
        client: Arc<dyn ChainClient>,
        processor: Arc<Processor>,
        store: Arc<dyn CheckpointStore>,
    ) -> HeightPipeline<EventsProducer> {
        let checkpoint = CheckpointManager::new(store, StreamKind::Events);
        let producer = EventsProducer::new(client.clone(), processor, checkpoint.clone());
        HeightPipeline::new(client, Arc::new(producer), self.config).with_checkpoint(checkpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let cfg = ProducerBuilder::new().build_config();
        assert_eq!(cfg, ProducerConfig::default());
        assert_eq!(cfg.queue_capacity, 100);
    }

    #[test]
    fn builder_custom() {
        let cfg = ProducerBuilder::new()
            .start_height(500)
            .num_workers(2)
            .queue_capacity(10)
            .mode(ExecutionMode::Sequential)
            .resume_from_checkpoint(true)
            .max_attempts(3)
            .retry(RetryBackoff::default())
            .build_config();

        assert_eq!(cfg.start_height, 500);
        assert_eq!(cfg.num_workers, 2);
        assert_eq!(cfg.queue_capacity, 10);
        assert_eq!(cfg.mode, ExecutionMode::Sequential);
        assert!(cfg.resume_from_checkpoint);
        assert_eq!(cfg.max_attempts, Some(3));
        assert!(cfg.retry.is_some());
    }
}
