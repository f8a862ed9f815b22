//! Message broker abstraction.

use async_trait::async_trait;

use crate::error::PipelineError;

/// Asynchronous, keyed publisher.
///
/// `publish_async` returning `Ok` means the record was *accepted for
/// sending*, not that it was delivered. Delivery failures are reported only
/// to the implementation's completion callback.
#[async_trait]
pub trait StreamingClient: Send + Sync {
    /// Route `message` by `type_name` and enqueue it keyed by `block_height`,
    /// so that every message of one height lands on the same partition.
    async fn publish_async(
        &self,
        type_name: &str,
        message: Vec<u8>,
        block_height: i64,
    ) -> Result<(), PipelineError>;

    /// Flush pending sends (bounded by a timeout) and close the connection.
    async fn close(&self) -> Result<(), PipelineError>;
}
