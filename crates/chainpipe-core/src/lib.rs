//! chainpipe-core: block ingestion pipeline for CometBFT/Cosmos chains.
//!
//! # Architecture
//!
//! ```text
//! App ──┬── HeightPipeline<TransactionsProducer>   (stream: transactions)
//!       └── HeightPipeline<EventsProducer>         (stream: events)
//!
//! HeightPipeline
//!     ├── sequencer   (cursor, tip discovery, bounded queue)
//!     └── workers     (HeightProcessor::process, re-enqueue on failure)
//!
//! Producer → ChainClient → Processor ──┬── Codec
//!                                      ├── Predicate filters
//!                                      ├── Message envelope
//!                                      └── StreamingClient (keyed by height)
//!          → CheckpointStore
//! ```

pub mod app;
pub mod broker;
pub mod builder;
pub mod checkpoint;
pub mod client;
pub mod codec;
pub mod envelope;
pub mod error;
pub mod filter;
pub mod pipeline;
pub mod processor;
pub mod producer;
pub mod router;
pub mod types;

pub use app::{App, AppError, AppSummary};
pub use broker::StreamingClient;
pub use builder::ProducerBuilder;
pub use checkpoint::{
    Checkpoint, CheckpointManager, CheckpointStatus, CheckpointStore, MemoryCheckpointStore,
    StreamKind,
};
pub use client::ChainClient;
pub use codec::{Codec, DecodedMessage};
pub use envelope::{build_message, BlockMetadata, Message, MessageKind, Metadata, Payload, TxLocation};
pub use error::{CodecError, EnvelopeError, PipelineError, RoutingError};
pub use filter::{EventTypeFilter, Predicate, TxMessageFilter, TypeFilter};
pub use pipeline::{
    ExecutionMode, HeightPipeline, HeightProcessor, ProducerConfig, RetryBackoff, RunSummary,
};
pub use processor::{tx_hash, BlockReport, EventOutcome, Processor};
pub use producer::{EventsProducer, TransactionsProducer};
pub use router::{TopicRoute, TopicRouter};
pub use types::{
    AbciEvent, AnyMessage, Block, BlockHeader, BlockResults, EventAttribute, Transaction, TxResult,
};
