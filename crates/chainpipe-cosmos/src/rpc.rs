//! CometBFT JSON-RPC wire types.
//!
//! CometBFT encodes 64-bit integers as JSON strings and transactions as
//! base64. The raw types below mirror the node's JSON; the `into_*` helpers
//! convert them to the chain-agnostic types of `chainpipe-core`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use chainpipe_core::types::{AbciEvent, Block, BlockHeader, BlockResults, TxResult};

// ─── JSON-RPC envelope ────────────────────────────────────────────────────────

/// A JSON-RPC 2.0 request with named parameters.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: &'static str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)?;
        if let Some(Value::String(data)) = &self.data {
            write!(f, " ({data})")?;
        }
        Ok(())
    }
}

/// A JSON-RPC 2.0 response.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// Accept `"123"` as well as `123`.
fn de_i64<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StrOrNum {
        Str(String),
        Num(i64),
    }
    match StrOrNum::deserialize(d)? {
        StrOrNum::Str(s) => s.parse().map_err(serde::de::Error::custom),
        StrOrNum::Num(n) => Ok(n),
    }
}

fn de_null_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

// ─── status ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct StatusResult {
    pub sync_info: SyncInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncInfo {
    #[serde(deserialize_with = "de_i64")]
    pub latest_block_height: i64,
    #[serde(default)]
    pub catching_up: bool,
}

// ─── block / blockchain ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct RawHeader {
    pub chain_id: String,
    #[serde(deserialize_with = "de_i64")]
    pub height: i64,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockId {
    pub hash: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawBlockData {
    #[serde(default, deserialize_with = "de_null_default")]
    pub txs: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawBlock {
    pub header: RawHeader,
    #[serde(default)]
    pub data: RawBlockData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockResult {
    pub block_id: BlockId,
    pub block: RawBlock,
}

impl BlockResult {
    /// Convert to a core block, base64-decoding every transaction.
    pub fn into_block(self) -> Result<Block, base64::DecodeError> {
        let txs = self
            .block
            .data
            .txs
            .iter()
            .map(|tx| BASE64.decode(tx))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Block {
            header: to_header(self.block.header, self.block_id.hash),
            txs,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockMeta {
    pub block_id: BlockId,
    pub header: RawHeader,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockchainResult {
    #[serde(default, deserialize_with = "de_null_default")]
    pub block_metas: Vec<BlockMeta>,
}

impl BlockchainResult {
    /// Header of the block at `height`, if the node returned it.
    pub fn into_header(self, height: i64) -> Option<BlockHeader> {
        self.block_metas
            .into_iter()
            .find(|m| m.header.height == height)
            .map(|m| to_header(m.header, m.block_id.hash))
    }
}

fn to_header(raw: RawHeader, hash: String) -> BlockHeader {
    BlockHeader {
        height: raw.height,
        chain_id: raw.chain_id,
        hash,
        time: raw.time,
    }
}

// ─── block_results ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct RawTxResult {
    #[serde(default, deserialize_with = "de_null_default")]
    pub events: Vec<AbciEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockResultsResult {
    #[serde(deserialize_with = "de_i64")]
    pub height: i64,
    #[serde(default, deserialize_with = "de_null_default")]
    pub txs_results: Vec<Option<RawTxResult>>,
    /// CometBFT 0.38+.
    #[serde(default, deserialize_with = "de_null_default")]
    pub finalize_block_events: Vec<AbciEvent>,
    /// CometBFT 0.37 and earlier.
    #[serde(default, deserialize_with = "de_null_default")]
    pub begin_block_events: Vec<AbciEvent>,
    #[serde(default, deserialize_with = "de_null_default")]
    pub end_block_events: Vec<AbciEvent>,
}

impl From<BlockResultsResult> for BlockResults {
    fn from(raw: BlockResultsResult) -> Self {
        let finalize_block_events = if raw.finalize_block_events.is_empty() {
            raw.begin_block_events
                .into_iter()
                .chain(raw.end_block_events)
                .collect()
        } else {
            raw.finalize_block_events
        };
        BlockResults {
            height: raw.height,
            txs_results: raw
                .txs_results
                .into_iter()
                .map(|r| r.map(|r| TxResult { events: r.events }))
                .collect(),
            finalize_block_events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK: &str = r#"{
        "block_id": {"hash": "6A1B0F0C9E3E1D7B2F1E0E5A4C3D2B1A0F9E8D7C6B5A49382716051423324150", "parts": {"total": 1, "hash": "00"}},
        "block": {
            "header": {
                "version": {"block": "11"},
                "chain_id": "allora-testnet-1",
                "height": "1250001",
                "time": "2024-09-01T12:00:05.123456789Z"
            },
            "data": {"txs": ["AQID", "BAU="]}
        }
    }"#;

    #[test]
    fn parses_block_and_decodes_txs() {
        let raw: BlockResult = serde_json::from_str(BLOCK).unwrap();
        let block = raw.into_block().unwrap();
        assert_eq!(block.header.height, 1_250_001);
        assert_eq!(block.header.chain_id, "allora-testnet-1");
        assert!(block.header.hash.starts_with("6A1B"));
        assert_eq!(block.txs, vec![vec![1, 2, 3], vec![4, 5]]);
    }

    #[test]
    fn empty_block_has_no_txs() {
        let json = r#"{
            "block_id": {"hash": "AA"},
            "block": {"header": {"chain_id": "c", "height": "2", "time": "2024-01-01T00:00:00Z"}, "data": {"txs": null}}
        }"#;
        let block = serde_json::from_str::<BlockResult>(json)
            .unwrap()
            .into_block()
            .unwrap();
        assert!(block.txs.is_empty());
    }

    #[test]
    fn parses_block_results_0_38() {
        let json = r#"{
            "height": "1250001",
            "txs_results": [
                {"code": 0, "events": [{"type": "emissions.v3.EventScoresSet", "attributes": [{"key": "topic_id", "value": "\"1\"", "index": true}]}]},
                null
            ],
            "finalize_block_events": [{"type": "mint", "attributes": []}],
            "validator_updates": null
        }"#;
        let results: BlockResults = serde_json::from_str::<BlockResultsResult>(json).unwrap().into();
        assert_eq!(results.height, 1_250_001);
        assert_eq!(results.txs_results.len(), 2);
        let events = &results.txs_results[0].as_ref().unwrap().events;
        assert_eq!(events[0].kind, "emissions.v3.EventScoresSet");
        assert_eq!(events[0].attributes[0].value, "\"1\"");
        assert!(results.txs_results[1].is_none());
        assert_eq!(results.finalize_block_events[0].kind, "mint");
    }

    #[test]
    fn failed_tx_result_keeps_its_events() {
        let json = r#"{
            "height": "7",
            "txs_results": [
                {"code": 5, "codespace": "sdk", "log": "insufficient funds", "events": [{"type": "tx", "attributes": []}]}
            ]
        }"#;
        let results: BlockResults = serde_json::from_str::<BlockResultsResult>(json).unwrap().into();
        let events = &results.txs_results[0].as_ref().unwrap().events;
        assert_eq!(events[0].kind, "tx");
    }

    #[test]
    fn begin_and_end_block_events_are_merged() {
        let json = r#"{
            "height": "10",
            "txs_results": null,
            "begin_block_events": [{"type": "coinbase", "attributes": []}],
            "end_block_events": [{"type": "complete_unbonding", "attributes": []}]
        }"#;
        let results: BlockResults = serde_json::from_str::<BlockResultsResult>(json).unwrap().into();
        let kinds: Vec<_> = results
            .finalize_block_events
            .iter()
            .map(|e| e.kind.as_str())
            .collect();
        assert_eq!(kinds, vec!["coinbase", "complete_unbonding"]);
    }

    #[test]
    fn blockchain_result_selects_height() {
        let json = r#"{
            "last_height": "20",
            "block_metas": [
                {"block_id": {"hash": "BB"}, "header": {"chain_id": "c", "height": "11", "time": "2024-01-01T00:00:01Z"}},
                {"block_id": {"hash": "AA"}, "header": {"chain_id": "c", "height": "10", "time": "2024-01-01T00:00:00Z"}}
            ]
        }"#;
        let result: BlockchainResult = serde_json::from_str(json).unwrap();
        let header = result.into_header(10).unwrap();
        assert_eq!(header.hash, "AA");
        assert_eq!(header.height, 10);
    }

    #[test]
    fn status_height_accepts_strings() {
        let json = r#"{"node_info": {}, "sync_info": {"latest_block_height": "987", "catching_up": false}}"#;
        let status: StatusResult = serde_json::from_str(json).unwrap();
        assert_eq!(status.sync_info.latest_block_height, 987);
    }
}
