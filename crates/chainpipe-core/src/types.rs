//! Chain data types consumed by the pipeline.
//!
//! These mirror the CometBFT RPC shapes closely enough for any Cosmos chain
//! client to fill them in, without tying the core to a wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Blocks ───────────────────────────────────────────────────────────────────

/// The subset of a block header the envelope needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block height.
    pub height: i64,
    /// Chain identifier (e.g. `"allora-testnet-1"`).
    pub chain_id: String,
    /// Block hash as reported by the node (uppercase hex for CometBFT).
    pub hash: String,
    /// Block time as agreed by consensus.
    pub time: DateTime<Utc>,
}

/// A full block: header plus raw transaction bytes in block order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub txs: Vec<Vec<u8>>,
}

// ─── Block results ────────────────────────────────────────────────────────────

/// One key/value attribute of an ABCI event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAttribute {
    pub key: String,
    pub value: String,
}

impl EventAttribute {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// An ABCI event, either attached to a transaction result or to the block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbciEvent {
    /// Event type. For typed events this is the fully-qualified proto name.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Vec<EventAttribute>,
}

impl AbciEvent {
    pub fn new(kind: impl Into<String>, attributes: Vec<EventAttribute>) -> Self {
        Self {
            kind: kind.into(),
            attributes,
        }
    }
}

/// Execution result of a single transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResult {
    #[serde(default)]
    pub events: Vec<AbciEvent>,
}

/// Results of executing a block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockResults {
    pub height: i64,
    /// One entry per transaction; `None` when the node returned no result.
    pub txs_results: Vec<Option<TxResult>>,
    /// Events emitted by the block as a whole.
    pub finalize_block_events: Vec<AbciEvent>,
}

// ─── Transactions ─────────────────────────────────────────────────────────────

/// A packed sub-message (protobuf `Any`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnyMessage {
    /// Type URL, usually with a leading `/` (e.g. `"/cosmos.bank.v1beta1.MsgSend"`).
    pub type_url: String,
    pub value: Vec<u8>,
}

impl AnyMessage {
    pub fn new(type_url: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            type_url: type_url.into(),
            value,
        }
    }
}

/// A decoded transaction body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    pub messages: Vec<AnyMessage>,
    pub memo: String,
}

/// Strip exactly one leading `/` from a type name.
pub fn trim_type_name(name: &str) -> &str {
    name.strip_prefix('/').unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trim_strips_a_single_slash() {
        assert_eq!(trim_type_name("/a.b.C"), "a.b.C");
        assert_eq!(trim_type_name("a.b.C"), "a.b.C");
        assert_eq!(trim_type_name("//a.b.C"), "/a.b.C");
        assert_eq!(trim_type_name(""), "");
    }

    #[test]
    fn event_kind_serializes_as_type() {
        let ev = AbciEvent::new("transfer", vec![EventAttribute::new("amount", "1uallo")]);
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "transfer");
        assert_eq!(json["attributes"][0]["key"], "amount");
    }
}
