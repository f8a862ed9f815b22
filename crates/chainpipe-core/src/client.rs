//! Chain client abstraction.

use async_trait::async_trait;

use crate::error::PipelineError;
use crate::types::{Block, BlockHeader, BlockResults};

/// Read access to a chain node.
///
/// Implementations must be cheap to share across tasks; the pipeline holds
/// them behind an `Arc` and calls them concurrently from every worker.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Height of the latest committed block.
    async fn latest_block_height(&self) -> Result<i64, PipelineError>;

    /// Full block at `height`, or `None` if the node does not have it.
    async fn block_by_height(&self, height: i64) -> Result<Option<Block>, PipelineError>;

    /// Execution results of the block at `height`.
    async fn block_results(&self, height: i64) -> Result<BlockResults, PipelineError>;

    /// Header (with block hash) of the block at `height`.
    async fn header(&self, height: i64) -> Result<BlockHeader, PipelineError>;
}
