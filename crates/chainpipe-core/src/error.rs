//! Error types for the chainpipe pipeline.

use thiserror::Error;

/// Errors that can occur while ingesting a height.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("failed to fetch {what} for height {height}: {reason}")]
    Fetch {
        height: i64,
        what: &'static str,
        reason: String,
    },

    #[error("block {height} not found")]
    BlockNotFound { height: i64 },

    #[error("failed to parse transaction {index}: {reason}")]
    ParseTransaction { index: usize, reason: String },

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("could not resolve start height after {attempts} attempts: {reason}")]
    Bootstrap { attempts: u32, reason: String },

    #[error("{0}")]
    Other(String),
}

impl PipelineError {
    /// Returns `true` for a single undecodable transaction, which is skipped
    /// rather than failing the whole block.
    pub fn is_parse_transaction(&self) -> bool {
        matches!(self, Self::ParseTransaction { .. })
    }

    /// Wrap an RPC error with the height and the resource being fetched.
    pub fn fetch(height: i64, what: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Fetch {
            height,
            what,
            reason: err.to_string(),
        }
    }
}

/// Errors raised while building a message envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("invalid message kind: {0}")]
    InvalidKind(String),

    #[error("message name is required")]
    EmptyName,

    #[error("payload serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors raised while resolving a broker topic.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("unknown message type: {type_name}")]
    UnknownType { type_name: String },
}

/// Errors raised by a [`Codec`](crate::codec::Codec) implementation.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed transaction: {0}")]
    MalformedTx(String),

    #[error("unsupported message type: {type_url}")]
    UnsupportedType { type_url: String },

    #[error("event {event_type} has no attributes")]
    EmptyEvent { event_type: String },

    #[error("event {event_type} is not a typed event: {reason}")]
    UntypedEvent { event_type: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
