//! chainpipe-kafka: the broker side of ChainPipe.
//!
//! [`KafkaStreamingClient`] implements
//! [`StreamingClient`](chainpipe_core::StreamingClient): it resolves the topic
//! of each message through a [`TopicRouter`](chainpipe_core::TopicRouter),
//! keys the record by block height and hands it to a [`RecordProducer`].
//!
//! Producers:
//! - [`MemoryProducer`]: buffers records in RAM (tests, failure injection)
//! - [`ConsoleProducer`]: logs every record (local runs without a broker)
//! - `RdKafkaProducer`: librdkafka (feature `rdkafka`)

pub mod client;
pub mod config;
pub mod console;
pub mod memory;
pub mod record;

#[cfg(feature = "rdkafka")]
pub mod rdkafka_producer;

pub use client::KafkaStreamingClient;
pub use config::KafkaConfig;
pub use console::ConsoleProducer;
pub use memory::MemoryProducer;
pub use record::{DeliveryCallback, DeliveryOutcome, KafkaError, Record, RecordProducer};

#[cfg(feature = "rdkafka")]
pub use rdkafka_producer::RdKafkaProducer;
