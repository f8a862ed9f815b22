//! Per-height transform: decode → filter → envelope → publish.
//!
//! The processor is stateless apart from its collaborators and is shared by
//! every worker of a stream. It never retries; a returned error makes the
//! scheduler retry the whole height.

use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::broker::StreamingClient;
use crate::codec::Codec;
use crate::envelope::{BlockMetadata, Message, MessageKind, Metadata, Payload, TxLocation};
use crate::error::PipelineError;
use crate::filter::{EventTypeFilter, Predicate, TxMessageFilter};
use crate::types::{AbciEvent, Block, BlockHeader, BlockResults};

/// Counters for one processed height.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockReport {
    /// Messages accepted by the broker.
    pub published: usize,
    /// Sub-messages or events rejected by the allowlist.
    pub filtered: usize,
    /// Transactions or events that were skipped after an error.
    pub failed: usize,
}

impl BlockReport {
    pub fn absorb(&mut self, other: BlockReport) {
        self.published += other.published;
        self.filtered += other.filtered;
        self.failed += other.failed;
    }
}

/// Result of handing a single event to [`Processor::process_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Published,
    Filtered,
}

/// Uppercase hex SHA-256 of the raw transaction bytes.
pub fn tx_hash(raw: &[u8]) -> String {
    hex::encode_upper(Sha256::digest(raw))
}

pub struct Processor {
    streaming: Arc<dyn StreamingClient>,
    codec: Arc<dyn Codec>,
    event_filter: EventTypeFilter,
    tx_filter: TxMessageFilter,
}

impl Processor {
    pub fn new(
        streaming: Arc<dyn StreamingClient>,
        codec: Arc<dyn Codec>,
        event_filter: EventTypeFilter,
        tx_filter: TxMessageFilter,
    ) -> Self {
        Self {
            streaming,
            codec,
            event_filter,
            tx_filter,
        }
    }

    // ─── Transactions ─────────────────────────────────────────────────────────

    /// Publish every allowlisted sub-message of every transaction in `block`.
    ///
    /// Undecodable transactions are logged and skipped. Any other error
    /// aborts the block.
    pub async fn process_block(&self, block: &Block) -> Result<BlockReport, PipelineError> {
        let mut report = BlockReport::default();
        for (index, raw) in block.txs.iter().enumerate() {
            match self.process_transaction(raw, index, &block.header).await {
                Ok(tx_report) => report.absorb(tx_report),
                Err(e) if e.is_parse_transaction() => {
                    tracing::warn!(height = block.header.height, tx_index = index, error = %e, "skipping transaction");
                    report.failed += 1;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    /// Decode one raw transaction and publish its allowlisted sub-messages.
    pub async fn process_transaction(
        &self,
        raw: &[u8],
        index: usize,
        header: &BlockHeader,
    ) -> Result<BlockReport, PipelineError> {
        let tx = self
            .codec
            .parse_transaction(raw)
            .map_err(|e| PipelineError::ParseTransaction {
                index,
                reason: e.to_string(),
            })?;
        let hash = tx_hash(raw);

        let mut report = BlockReport::default();
        for msg in &tx.messages {
            if !self.tx_filter.should_process(Some(msg)) {
                tracing::debug!(height = header.height, tx_index = index, type_url = %msg.type_url, "sub-message filtered out");
                report.filtered += 1;
                continue;
            }

            let decoded = self.codec.parse_sub_message(msg)?;
            let data = self.codec.marshal_json(&decoded)?;
            let metadata = Metadata::build(
                BlockMetadata::from(header),
                Some(TxLocation::new(index, hash.clone())),
                &msg.type_url,
            );
            let message = Message::build(
                MessageKind::Transaction,
                &msg.type_url,
                Payload::new(metadata, &data)?,
            )?;

            self.streaming
                .publish_async(&msg.type_url, message.to_json()?, header.height)
                .await?;
            tracing::debug!(height = header.height, tx_index = index, type_url = %msg.type_url, id = %message.id, "published transaction message");
            report.published += 1;
        }
        Ok(report)
    }

    // ─── Events ───────────────────────────────────────────────────────────────

    /// Publish the allowlisted events of every transaction result and of the
    /// block itself. A failing event is logged and its siblings still go out.
    pub async fn process_block_results(
        &self,
        results: &BlockResults,
        header: &BlockHeader,
    ) -> Result<BlockReport, PipelineError> {
        let mut report = BlockReport::default();

        for (index, tx_result) in results.txs_results.iter().enumerate() {
            let Some(tx_result) = tx_result else {
                tracing::warn!(height = header.height, tx_index = index, "missing transaction result");
                continue;
            };
            for event in &tx_result.events {
                let outcome = self.process_event(event, header).await;
                self.record_event(&mut report, event, header, outcome);
            }
        }

        for event in &results.finalize_block_events {
            let outcome = self.process_event(event, header).await;
            self.record_event(&mut report, event, header, outcome);
        }

        Ok(report)
    }

    /// Decode and publish a single event.
    ///
    /// Event messages carry no transaction index or hash, even for events of a
    /// transaction result. Events rejected by the allowlist return
    /// [`EventOutcome::Filtered`] without being decoded.
    pub async fn process_event(
        &self,
        event: &AbciEvent,
        header: &BlockHeader,
    ) -> Result<EventOutcome, PipelineError> {
        if !self.event_filter.should_process(Some(event)) {
            return Ok(EventOutcome::Filtered);
        }

        let decoded = if self.codec.is_typed_event(event) {
            self.codec.parse_event(event)?
        } else {
            self.codec.parse_untyped_event(event)?
        };
        let data = self.codec.marshal_json(&decoded)?;
        let metadata = Metadata::build(BlockMetadata::from(header), None, &event.kind);
        let message = Message::build(MessageKind::Event, &event.kind, Payload::new(metadata, &data)?)?;

        self.streaming
            .publish_async(&event.kind, message.to_json()?, header.height)
            .await?;
        tracing::debug!(height = header.height, event_type = %event.kind, id = %message.id, "published event");
        Ok(EventOutcome::Published)
    }

    fn record_event(
        &self,
        report: &mut BlockReport,
        event: &AbciEvent,
        header: &BlockHeader,
        outcome: Result<EventOutcome, PipelineError>,
    ) {
        match outcome {
            Ok(EventOutcome::Published) => report.published += 1,
            Ok(EventOutcome::Filtered) => report.filtered += 1,
            Err(e) => {
                tracing::warn!(height = header.height, event_type = %event.kind, error = %e, "failed to process event");
                report.failed += 1;
            }
        }
    }
}
