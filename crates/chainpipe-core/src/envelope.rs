//! The canonical message envelope published to the broker.
//!
//! Every message is content-addressed: its `id` is `0x` + the lowercase hex
//! SHA-256 of the canonical JSON encoding of its `payload`. The `type`,
//! `name` and `timestamp` fields wrap the payload but never feed the hash,
//! so re-processing a height re-publishes messages with identical ids.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use sha2::{Digest, Sha256};

use crate::error::EnvelopeError;
use crate::types::{trim_type_name, BlockHeader};

// ─── MessageKind ──────────────────────────────────────────────────────────────

/// Whether a message carries an event or a transaction sub-message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Event,
    Transaction,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Transaction => "transaction",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = EnvelopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "event" => Ok(Self::Event),
            "transaction" => Ok(Self::Transaction),
            other => Err(EnvelopeError::InvalidKind(other.to_string())),
        }
    }
}

// ─── Metadata ─────────────────────────────────────────────────────────────────

/// Block-level metadata attached to every message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMetadata {
    pub height: i64,
    pub chain_id: String,
    pub hash: String,
    pub time: DateTime<Utc>,
}

impl From<&BlockHeader> for BlockMetadata {
    fn from(header: &BlockHeader) -> Self {
        Self {
            height: header.height,
            chain_id: header.chain_id.clone(),
            hash: header.hash.clone(),
            time: header.time,
        }
    }
}

/// Position of the originating transaction inside its block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxLocation {
    pub index: usize,
    /// Uppercase hex SHA-256 of the raw transaction.
    pub hash: String,
}

impl TxLocation {
    pub fn new(index: usize, hash: impl Into<String>) -> Self {
        Self {
            index,
            hash: hash.into(),
        }
    }
}

/// Transaction-level metadata. Index and hash are omitted for events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Fully-qualified type name, without the leading `/`.
    #[serde(rename = "type")]
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub block_metadata: BlockMetadata,
    pub transaction_metadata: TransactionMetadata,
}

impl Metadata {
    /// Assemble message metadata. Strips one leading `/` from `type_name`.
    pub fn build(block: BlockMetadata, tx: Option<TxLocation>, type_name: &str) -> Self {
        let (tx_index, tx_hash) = match tx {
            Some(loc) => (Some(loc.index), Some(loc.hash)),
            None => (None, None),
        };
        Self {
            block_metadata: block,
            transaction_metadata: TransactionMetadata {
                tx_index,
                tx_hash,
                type_name: trim_type_name(type_name).to_string(),
            },
        }
    }
}

// ─── Payload ──────────────────────────────────────────────────────────────────

/// Metadata plus the decoder's JSON, embedded verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payload {
    pub metadata: Metadata,
    pub data: Box<RawValue>,
}

impl Payload {
    /// Wrap already-serialized JSON. Fails if `data` is not valid JSON.
    pub fn new(metadata: Metadata, data: &[u8]) -> Result<Self, EnvelopeError> {
        let data: Box<RawValue> = serde_json::from_slice(data)?;
        Ok(Self { metadata, data })
    }

    /// Content address of this payload: `0x` + hex SHA-256 of its canonical JSON.
    pub fn content_id(&self) -> Result<String, EnvelopeError> {
        let bytes = serde_json::to_vec(self)?;
        let digest = Sha256::digest(&bytes);
        Ok(format!("0x{}", hex::encode(digest)))
    }
}

// ─── Message ──────────────────────────────────────────────────────────────────

/// The envelope serialized onto the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub payload: Payload,
}

impl Message {
    /// Build an envelope, minting its content-addressed id.
    pub fn build(kind: MessageKind, name: &str, payload: Payload) -> Result<Self, EnvelopeError> {
        let name = trim_type_name(name);
        if name.is_empty() {
            return Err(EnvelopeError::EmptyName);
        }
        Ok(Self {
            id: payload.content_id()?,
            kind,
            name: name.to_string(),
            timestamp: Utc::now(),
            payload,
        })
    }

    /// Serialize the envelope to its wire representation.
    pub fn to_json(&self) -> Result<Vec<u8>, EnvelopeError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// String-kind entry point: rejects anything but `event` / `transaction`.
pub fn build_message(kind: &str, name: &str, payload: Payload) -> Result<Message, EnvelopeError> {
    Message::build(kind.parse()?, name, payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn header() -> BlockHeader {
        BlockHeader {
            height: 42,
            chain_id: "allora-testnet-1".into(),
            hash: "ABCDEF".into(),
            time: Utc.with_ymd_and_hms(2024, 9, 1, 12, 0, 0).unwrap(),
        }
    }

    fn payload(data: &str) -> Payload {
        let md = Metadata::build(
            BlockMetadata::from(&header()),
            Some(TxLocation::new(3, "DEADBEEF")),
            "/emissions.v3.MsgInsertWorkerPayload",
        );
        Payload::new(md, data.as_bytes()).unwrap()
    }

    #[test]
    fn id_depends_only_on_payload() {
        let a = Message::build(MessageKind::Transaction, "/a.b.C", payload(r#"{"x":1}"#)).unwrap();
        let b = Message::build(MessageKind::Event, "other.Name", payload(r#"{"x":1}"#)).unwrap();
        assert_eq!(a.id, b.id);
        assert!(a.id.starts_with("0x"));
        assert_eq!(a.id.len(), 66);
        assert!(a.id[2..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

        let c = Message::build(MessageKind::Transaction, "/a.b.C", payload(r#"{"x":2}"#)).unwrap();
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn invalid_kind_rejected() {
        let err = build_message("bogus", "a.b.C", payload("{}")).unwrap_err();
        assert!(matches!(err, EnvelopeError::InvalidKind(k) if k == "bogus"));
    }

    #[test]
    fn empty_name_rejected() {
        let err = build_message("event", "", payload("{}")).unwrap_err();
        assert!(matches!(err, EnvelopeError::EmptyName));
        let err = build_message("event", "/", payload("{}")).unwrap_err();
        assert!(matches!(err, EnvelopeError::EmptyName));
    }

    #[test]
    fn metadata_strips_one_leading_slash() {
        let md = Metadata::build(BlockMetadata::from(&header()), None, "/a.b.C");
        assert_eq!(md.transaction_metadata.type_name, "a.b.C");
        let md = Metadata::build(BlockMetadata::from(&header()), None, "a.b.C");
        assert_eq!(md.transaction_metadata.type_name, "a.b.C");
    }

    #[test]
    fn wire_format_field_names() {
        let msg = build_message("transaction", "/a.b.C", payload(r#"{"k":"v"}"#)).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&msg.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "transaction");
        assert_eq!(json["name"], "a.b.C");
        let md = &json["payload"]["metadata"];
        assert_eq!(md["block_metadata"]["height"], 42);
        assert_eq!(md["block_metadata"]["chain_id"], "allora-testnet-1");
        assert_eq!(md["transaction_metadata"]["tx_index"], 3);
        assert_eq!(md["transaction_metadata"]["tx_hash"], "DEADBEEF");
        assert_eq!(md["transaction_metadata"]["type"], "emissions.v3.MsgInsertWorkerPayload");
        assert_eq!(json["payload"]["data"]["k"], "v");
    }

    #[test]
    fn block_events_omit_tx_fields() {
        let md = Metadata::build(BlockMetadata::from(&header()), None, "a.b.EventX");
        let json = serde_json::to_value(&md).unwrap();
        assert!(json["transaction_metadata"].get("tx_index").is_none());
        assert!(json["transaction_metadata"].get("tx_hash").is_none());
    }

    #[test]
    fn payload_rejects_invalid_json() {
        let md = Metadata::build(BlockMetadata::from(&header()), None, "a.b.C");
        assert!(Payload::new(md, b"{not json").is_err());
    }

    #[test]
    fn kind_parses_round_trip() {
        assert_eq!("event".parse::<MessageKind>().unwrap(), MessageKind::Event);
        assert_eq!(MessageKind::Transaction.to_string(), "transaction");
    }
}
