//! Checkpoints: one record per successfully processed height and stream.
//!
//! A checkpoint is written after every message of a height has been accepted
//! by the broker. The read path returns a zero-value record when the stream
//! has never completed a height.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// The two independent ingestion streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Transactions,
    Events,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transactions => "transactions",
            Self::Events => "events",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing status of a checkpointed height.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

impl CheckpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckpointStatus {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(PipelineError::Storage(format!(
                "unknown checkpoint status: {other}"
            ))),
        }
    }
}

/// A persisted processing record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Store-assigned identifier (0 until persisted).
    pub id: i64,
    pub height: i64,
    pub processed_at: DateTime<Utc>,
    pub status: CheckpointStatus,
}

impl Checkpoint {
    /// A completed record for `height`, stamped now.
    pub fn completed(height: i64) -> Self {
        Self {
            id: 0,
            height,
            processed_at: Utc::now(),
            status: CheckpointStatus::Completed,
        }
    }

    /// `true` for the zero-value record returned when nothing was saved yet.
    pub fn is_empty(&self) -> bool {
        self.height == 0 && self.id == 0
    }
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self {
            id: 0,
            height: 0,
            processed_at: DateTime::<Utc>::default(),
            status: CheckpointStatus::Pending,
        }
    }
}

/// Trait for storing and loading checkpoints.
///
/// Implementations include [`MemoryCheckpointStore`] and the stores in
/// `chainpipe-storage`.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Append a processing record for `stream`.
    async fn save(&self, stream: StreamKind, checkpoint: &Checkpoint) -> Result<(), PipelineError>;

    /// Highest processed record for `stream`, or a zero-value record.
    async fn last_processed(&self, stream: StreamKind) -> Result<Checkpoint, PipelineError>;
}

/// Binds a store to one stream.
#[derive(Clone)]
pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
    stream: StreamKind,
}

impl CheckpointManager {
    pub fn new(store: Arc<dyn CheckpointStore>, stream: StreamKind) -> Self {
        Self { store, stream }
    }

    pub fn stream(&self) -> StreamKind {
        self.stream
    }

    /// Record `height` as completed.
    pub async fn mark_completed(&self, height: i64) -> Result<(), PipelineError> {
        self.store
            .save(self.stream, &Checkpoint::completed(height))
            .await
    }

    /// Load the last processed record (zero-value if none).
    pub async fn load(&self) -> Result<Checkpoint, PipelineError> {
        self.store.last_processed(self.stream).await
    }
}

// ─── In-memory store ──────────────────────────────────────────────────────────

/// Keeps the highest record per stream. For tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    data: Mutex<HashMap<StreamKind, Checkpoint>>,
    next_id: Mutex<i64>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, stream: StreamKind, checkpoint: &Checkpoint) -> Result<(), PipelineError> {
        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            *next
        };
        let mut data = self.data.lock().unwrap();
        let keep_existing = data
            .get(&stream)
            .map_or(false, |cur| cur.height > checkpoint.height);
        if !keep_existing {
            data.insert(
                stream,
                Checkpoint {
                    id,
                    ..checkpoint.clone()
                },
            );
        }
        Ok(())
    }

    async fn last_processed(&self, stream: StreamKind) -> Result<Checkpoint, PipelineError> {
        Ok(self
            .data
            .lock()
            .unwrap()
            .get(&stream)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_store_returns_zero_value() {
        let store = MemoryCheckpointStore::new();
        let cp = store.last_processed(StreamKind::Events).await.unwrap();
        assert!(cp.is_empty());
        assert_eq!(cp, Checkpoint::default());
    }

    #[tokio::test]
    async fn streams_are_independent() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let txs = CheckpointManager::new(store.clone(), StreamKind::Transactions);
        let events = CheckpointManager::new(store.clone(), StreamKind::Events);

        txs.mark_completed(100).await.unwrap();
        txs.mark_completed(101).await.unwrap();
        events.mark_completed(7).await.unwrap();

        let t = txs.load().await.unwrap();
        assert_eq!(t.height, 101);
        assert_eq!(t.status, CheckpointStatus::Completed);
        assert!(t.id > 0);
        assert_eq!(events.load().await.unwrap().height, 7);
    }

    #[tokio::test]
    async fn out_of_order_save_keeps_highest() {
        let store = MemoryCheckpointStore::new();
        store
            .save(StreamKind::Events, &Checkpoint::completed(10))
            .await
            .unwrap();
        store
            .save(StreamKind::Events, &Checkpoint::completed(9))
            .await
            .unwrap();
        let cp = store.last_processed(StreamKind::Events).await.unwrap();
        assert_eq!(cp.height, 10);
    }

    #[test]
    fn status_parses() {
        assert_eq!(
            "completed".parse::<CheckpointStatus>().unwrap(),
            CheckpointStatus::Completed
        );
        assert!("done".parse::<CheckpointStatus>().is_err());
    }
}
