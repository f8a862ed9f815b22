//! CometBFT JSON-RPC client backed by `reqwest`.
//!
//! One HTTP POST per call; no retries here. Failed calls surface as
//! [`PipelineError::Rpc`] and the scheduler retries the whole height.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;
use url::Url;

use chainpipe_core::client::ChainClient;
use chainpipe_core::error::PipelineError;
use chainpipe_core::types::{Block, BlockHeader, BlockResults};

use crate::rpc::{
    BlockResult, BlockResultsResult, BlockchainResult, JsonRpcError, JsonRpcRequest,
    JsonRpcResponse, StatusResult,
};

/// Errors raised by [`CometRpcClient`].
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("invalid RPC url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("{0}")]
    JsonRpc(JsonRpcError),

    #[error("empty result for {method}")]
    EmptyResult { method: &'static str },

    #[error("failed to decode {method} response: {reason}")]
    Decode {
        method: &'static str,
        reason: String,
    },
}

impl RpcError {
    /// CometBFT's answer when asked for a height above its tip.
    pub fn is_height_unavailable(&self) -> bool {
        match self {
            Self::JsonRpc(e) => {
                let text = format!("{} {:?}", e.message, e.data);
                text.contains("must be less than or equal to the current blockchain height")
                    || text.contains("could not find results for height")
            }
            _ => false,
        }
    }
}

impl From<RpcError> for PipelineError {
    fn from(e: RpcError) -> Self {
        PipelineError::Rpc(e.to_string())
    }
}

/// Configuration for `CometRpcClient`.
#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    pub request_timeout: Duration,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// [`ChainClient`] for a CometBFT node.
pub struct CometRpcClient {
    url: Url,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl CometRpcClient {
    /// Create a client for the node's RPC endpoint (e.g. `http://localhost:26657`).
    pub fn new(url: &str, config: RpcClientConfig) -> Result<Self, RpcError> {
        let url = Url::parse(url).map_err(|e| RpcError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| RpcError::Http(e.to_string()))?;
        Ok(Self {
            url,
            http,
            next_id: AtomicU64::new(1),
        })
    }

    /// Create with default configuration.
    pub fn default_for(url: &str) -> Result<Self, RpcError> {
        Self::new(url, RpcClientConfig::default())
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: serde_json::Value,
    ) -> Result<T, RpcError> {
        let started = Instant::now();
        let req = JsonRpcRequest::new(self.next_id.fetch_add(1, Ordering::Relaxed), method, params);

        let resp = self
            .http
            .post(self.url.clone())
            .json(&req)
            .send()
            .await
            .map_err(|e| RpcError::Http(e.to_string()))?;

        // CometBFT answers JSON-RPC errors with HTTP 500 and a JSON body.
        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| RpcError::Http(e.to_string()))?;
        let parsed: JsonRpcResponse = match serde_json::from_slice(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(RpcError::Http(format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    String::from_utf8_lossy(&body)
                )))
            }
            Err(e) => {
                return Err(RpcError::Decode {
                    method,
                    reason: e.to_string(),
                })
            }
        };

        tracing::trace!(
            method,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "rpc call finished"
        );

        if let Some(err) = parsed.error {
            return Err(RpcError::JsonRpc(err));
        }
        let result = parsed.result.ok_or(RpcError::EmptyResult { method })?;
        serde_json::from_value(result).map_err(|e| RpcError::Decode {
            method,
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl ChainClient for CometRpcClient {
    async fn latest_block_height(&self) -> Result<i64, PipelineError> {
        let status: StatusResult = self.call("status", json!({})).await?;
        Ok(status.sync_info.latest_block_height)
    }

    async fn block_by_height(&self, height: i64) -> Result<Option<Block>, PipelineError> {
        let result = self
            .call::<BlockResult>("block", json!({ "height": height.to_string() }))
            .await;
        match result {
            Ok(raw) => raw
                .into_block()
                .map(Some)
                .map_err(|e| PipelineError::fetch(height, "block", format!("bad tx encoding: {e}"))),
            Err(e) if e.is_height_unavailable() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn block_results(&self, height: i64) -> Result<BlockResults, PipelineError> {
        let raw: BlockResultsResult = self
            .call("block_results", json!({ "height": height.to_string() }))
            .await?;
        Ok(raw.into())
    }

    async fn header(&self, height: i64) -> Result<BlockHeader, PipelineError> {
        let h = height.to_string();
        let raw: BlockchainResult = self
            .call("blockchain", json!({ "minHeight": h, "maxHeight": h }))
            .await?;
        raw.into_header(height)
            .ok_or(PipelineError::BlockNotFound { height })
    }
}
