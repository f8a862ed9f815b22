//! In-memory storage backend.
//!
//! Holds only the highest processing record per stream, which is all
//! `last_processed` ever returns. All data is lost when the process exits.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use chainpipe_core::checkpoint::{Checkpoint, CheckpointStore, StreamKind};
use chainpipe_core::error::PipelineError;

#[derive(Default)]
pub struct InMemoryStorage {
    latest: Mutex<HashMap<StreamKind, Checkpoint>>,
    next_id: Mutex<i64>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held across all streams.
    pub fn len(&self) -> usize {
        self.latest.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget the record of `stream` if it is above `height`.
    pub fn rollback_after(&self, stream: StreamKind, height: i64) {
        let mut latest = self.latest.lock().unwrap();
        if latest.get(&stream).map_or(false, |r| r.height > height) {
            latest.remove(&stream);
        }
    }
}

#[async_trait]
impl CheckpointStore for InMemoryStorage {
    async fn save(&self, stream: StreamKind, checkpoint: &Checkpoint) -> Result<(), PipelineError> {
        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            *next
        };
        let mut latest = self.latest.lock().unwrap();
        // Workers finish out of order; a lower height never replaces a higher one.
        if latest.get(&stream).map_or(true, |r| checkpoint.height >= r.height) {
            latest.insert(
                stream,
                Checkpoint {
                    id,
                    ..checkpoint.clone()
                },
            );
        }
        tracing::trace!(%stream, height = checkpoint.height, "checkpoint saved");
        Ok(())
    }

    async fn last_processed(&self, stream: StreamKind) -> Result<Checkpoint, PipelineError> {
        Ok(self
            .latest
            .lock()
            .unwrap()
            .get(&stream)
            .cloned()
            .unwrap_or_default())
    }
}
