//! chainpipe-storage: checkpoint backends for ChainPipe.
//!
//! Backends:
//! - [`memory`]: in-memory (dev/testing, no persistence)
//! - `postgres`: PostgreSQL via `sqlx` (feature `postgres`)

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemoryStorage;

#[cfg(feature = "postgres")]
pub use postgres::PostgresStorage;

use chainpipe_core::checkpoint::StreamKind;

/// Table holding the processing records of `stream`.
pub fn table_name(stream: StreamKind) -> &'static str {
    match stream {
        StreamKind::Transactions => "processed_block_transactions",
        StreamKind::Events => "processed_block_events",
    }
}
