//! Per-stream entry points: fetch a height, run it through the processor,
//! then write the checkpoint.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::checkpoint::CheckpointManager;
use crate::client::ChainClient;
use crate::error::PipelineError;
use crate::pipeline::HeightProcessor;
use crate::processor::{BlockReport, Processor};

// ─── Transactions ─────────────────────────────────────────────────────────────

/// Publishes the sub-messages of every transaction in a block.
pub struct TransactionsProducer {
    client: Arc<dyn ChainClient>,
    processor: Arc<Processor>,
    checkpoint: CheckpointManager,
}

impl TransactionsProducer {
    pub fn new(
        client: Arc<dyn ChainClient>,
        processor: Arc<Processor>,
        checkpoint: CheckpointManager,
    ) -> Self {
        Self {
            client,
            processor,
            checkpoint,
        }
    }

    /// Fetch the block at `height`, publish it and checkpoint it.
    pub async fn process_block(&self, height: i64) -> Result<BlockReport, PipelineError> {
        let started = Instant::now();

        let block = self
            .client
            .block_by_height(height)
            .await
            .map_err(|e| PipelineError::fetch(height, "block", e))?
            .ok_or(PipelineError::BlockNotFound { height })?;

        let report = self.processor.process_block(&block).await?;
        self.checkpoint.mark_completed(height).await?;

        tracing::info!(
            height,
            txs = block.txs.len(),
            published = report.published,
            filtered = report.filtered,
            failed = report.failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "processed block"
        );
        Ok(report)
    }
}

#[async_trait]
impl HeightProcessor for TransactionsProducer {
    async fn process(&self, height: i64) -> Result<(), PipelineError> {
        self.process_block(height).await.map(|_| ())
    }

    fn name(&self) -> &str {
        self.checkpoint.stream().as_str()
    }
}

// ─── Events ───────────────────────────────────────────────────────────────────

/// Publishes the events emitted while executing a block.
pub struct EventsProducer {
    client: Arc<dyn ChainClient>,
    processor: Arc<Processor>,
    checkpoint: CheckpointManager,
}

impl EventsProducer {
    pub fn new(
        client: Arc<dyn ChainClient>,
        processor: Arc<Processor>,
        checkpoint: CheckpointManager,
    ) -> Self {
        Self {
            client,
            processor,
            checkpoint,
        }
    }

    /// Fetch the results and header at `height`, publish the events and
    /// checkpoint the height.
    pub async fn process_block_results(&self, height: i64) -> Result<BlockReport, PipelineError> {
        let started = Instant::now();

        let (results, header) = tokio::try_join!(
            async {
                self.client
                    .block_results(height)
                    .await
                    .map_err(|e| PipelineError::fetch(height, "block results", e))
            },
            async {
                self.client
                    .header(height)
                    .await
                    .map_err(|e| PipelineError::fetch(height, "header", e))
            },
        )?;

        let report = self.processor.process_block_results(&results, &header).await?;
        self.checkpoint.mark_completed(height).await?;

        tracing::info!(
            height,
            published = report.published,
            filtered = report.filtered,
            failed = report.failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "processed block results"
        );
        Ok(report)
    }
}

#[async_trait]
impl HeightProcessor for EventsProducer {
    async fn process(&self, height: i64) -> Result<(), PipelineError> {
        self.process_block_results(height).await.map(|_| ())
    }

    fn name(&self) -> &str {
        self.checkpoint.stream().as_str()
    }
}
