//! Cosmos SDK codec: protobuf transactions, `Any` sub-messages and typed
//! ABCI events.
//!
//! Sub-messages are decoded through a registry keyed by fully-qualified type
//! name. Types without a registered decoder are emitted as
//! `{"@type": <type_url>, "value": <base64>}` so nothing is silently lost.
//!
//! Typed events (those emitted with `EmitTypedEvent`) carry one attribute per
//! proto field, each value being that field's JSON encoding. They are
//! decoded back into a JSON object, dropping the trailing `mode` attribute
//! the SDK appends.

use std::collections::{HashMap, HashSet};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use prost::Message as _;
use serde_json::{json, Map, Value};

use chainpipe_core::codec::{Codec, DecodedMessage};
use chainpipe_core::error::CodecError;
use chainpipe_core::types::{trim_type_name, AbciEvent, AnyMessage, Transaction};

use crate::proto;

/// Decodes the `value` bytes of an `Any` into its JSON form.
pub type MessageDecoder = fn(&[u8]) -> Result<Value, CodecError>;

fn malformed(e: prost::DecodeError) -> CodecError {
    CodecError::MalformedTx(e.to_string())
}

fn coin_json(coin: &proto::Coin) -> Value {
    json!({ "denom": coin.denom, "amount": coin.amount })
}

fn decode_msg_send(bytes: &[u8]) -> Result<Value, CodecError> {
    let msg = proto::MsgSend::decode(bytes).map_err(malformed)?;
    Ok(json!({
        "from_address": msg.from_address,
        "to_address": msg.to_address,
        "amount": msg.amount.iter().map(coin_json).collect::<Vec<_>>(),
    }))
}

fn decode_msg_delegate(bytes: &[u8]) -> Result<Value, CodecError> {
    let msg = proto::MsgDelegate::decode(bytes).map_err(malformed)?;
    Ok(json!({
        "delegator_address": msg.delegator_address,
        "validator_address": msg.validator_address,
        "amount": msg.amount.as_ref().map(coin_json),
    }))
}

fn decode_msg_withdraw_reward(bytes: &[u8]) -> Result<Value, CodecError> {
    let msg = proto::MsgWithdrawDelegatorReward::decode(bytes).map_err(malformed)?;
    Ok(json!({
        "delegator_address": msg.delegator_address,
        "validator_address": msg.validator_address,
    }))
}

/// `true` for names shaped like a proto message: `pkg.sub.TypeName`.
fn is_qualified_proto_name(name: &str) -> bool {
    match name.rsplit_once('.') {
        Some((package, ty)) => {
            !package.is_empty() && ty.chars().next().map_or(false, |c| c.is_ascii_uppercase())
        }
        None => false,
    }
}

/// [`Codec`] for Cosmos SDK chains.
pub struct ProtoCodec {
    decoders: HashMap<String, MessageDecoder>,
    typed_events: HashSet<String>,
    infer_typed_events: bool,
}

impl Default for ProtoCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtoCodec {
    /// A codec with the bank, staking and distribution messages registered.
    pub fn new() -> Self {
        let mut codec = Self {
            decoders: HashMap::new(),
            typed_events: HashSet::new(),
            infer_typed_events: true,
        };
        codec
            .register_message("cosmos.bank.v1beta1.MsgSend", decode_msg_send)
            .register_message("cosmos.staking.v1beta1.MsgDelegate", decode_msg_delegate)
            .register_message("cosmos.staking.v1beta1.MsgUndelegate", decode_msg_delegate)
            .register_message(
                "cosmos.distribution.v1beta1.MsgWithdrawDelegatorReward",
                decode_msg_withdraw_reward,
            );
        codec
    }

    /// Register (or replace) the decoder for `type_name`.
    pub fn register_message(&mut self, type_name: &str, decoder: MessageDecoder) -> &mut Self {
        self.decoders
            .insert(trim_type_name(type_name).to_string(), decoder);
        self
    }

    /// Mark `type_name` as a typed event.
    pub fn register_typed_event(&mut self, type_name: &str) -> &mut Self {
        self.typed_events.insert(trim_type_name(type_name).to_string());
        self
    }

    /// When enabled (default), any event named like a proto message is
    /// treated as typed even if it was not registered.
    pub fn infer_typed_events(mut self, infer: bool) -> Self {
        self.infer_typed_events = infer;
        self
    }

    pub fn has_decoder(&self, type_name: &str) -> bool {
        self.decoders.contains_key(trim_type_name(type_name))
    }
}

impl Codec for ProtoCodec {
    fn parse_transaction(&self, raw: &[u8]) -> Result<Transaction, CodecError> {
        let tx = proto::Tx::decode(raw).map_err(malformed)?;
        let body = tx
            .body
            .ok_or_else(|| CodecError::MalformedTx("transaction has no body".into()))?;
        Ok(Transaction {
            messages: body
                .messages
                .into_iter()
                .map(|any| AnyMessage::new(any.type_url, any.value))
                .collect(),
            memo: body.memo,
        })
    }

    fn parse_sub_message(&self, msg: &AnyMessage) -> Result<DecodedMessage, CodecError> {
        let type_name = trim_type_name(&msg.type_url);
        let value = match self.decoders.get(type_name) {
            Some(decode) => decode(&msg.value)?,
            None => {
                tracing::trace!(type_url = %msg.type_url, "no decoder registered, emitting raw value");
                json!({ "@type": msg.type_url, "value": BASE64.encode(&msg.value) })
            }
        };
        Ok(DecodedMessage::new(type_name, value))
    }

    fn parse_event(&self, event: &AbciEvent) -> Result<DecodedMessage, CodecError> {
        let mut attributes = event.attributes.as_slice();
        if attributes.is_empty() {
            return Err(CodecError::EmptyEvent {
                event_type: event.kind.clone(),
            });
        }
        if let Some((last, rest)) = attributes.split_last() {
            if last.key == "mode" {
                attributes = rest;
            }
        }

        let mut fields = Map::with_capacity(attributes.len());
        for attr in attributes {
            let value: Value =
                serde_json::from_str(&attr.value).map_err(|e| CodecError::UntypedEvent {
                    event_type: event.kind.clone(),
                    reason: format!("attribute {}: {e}", attr.key),
                })?;
            fields.insert(attr.key.clone(), value);
        }
        Ok(DecodedMessage::new(
            trim_type_name(&event.kind),
            Value::Object(fields),
        ))
    }

    fn is_typed_event(&self, event: &AbciEvent) -> bool {
        let name = trim_type_name(&event.kind);
        self.typed_events.contains(name) || (self.infer_typed_events && is_qualified_proto_name(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainpipe_core::types::EventAttribute;

    fn any(type_url: &str, value: Vec<u8>) -> proto::Any {
        proto::Any {
            type_url: type_url.into(),
            value,
        }
    }

    fn msg_send() -> proto::MsgSend {
        proto::MsgSend {
            from_address: "allo1sender".into(),
            to_address: "allo1recipient".into(),
            amount: vec![proto::Coin {
                denom: "uallo".into(),
                amount: "2500".into(),
            }],
        }
    }

    fn tx_bytes(messages: Vec<proto::Any>) -> Vec<u8> {
        proto::Tx {
            body: Some(proto::TxBody {
                messages,
                memo: "hello".into(),
                timeout_height: 0,
            }),
        }
        .encode_to_vec()
    }

    #[test]
    fn decodes_transaction_messages() {
        let raw = tx_bytes(vec![
            any("/cosmos.bank.v1beta1.MsgSend", msg_send().encode_to_vec()),
            any("/emissions.v3.MsgInsertWorkerPayload", vec![1, 2, 3]),
        ]);
        let tx = ProtoCodec::new().parse_transaction(&raw).unwrap();
        assert_eq!(tx.memo, "hello");
        assert_eq!(tx.messages.len(), 2);
        assert_eq!(tx.messages[0].type_url, "/cosmos.bank.v1beta1.MsgSend");
    }

    #[test]
    fn garbage_is_malformed() {
        let err = ProtoCodec::new()
            .parse_transaction(&[0xff, 0xff, 0xff])
            .unwrap_err();
        assert!(matches!(err, CodecError::MalformedTx(_)));
    }

    #[test]
    fn registered_message_decodes_to_json() {
        let codec = ProtoCodec::new();
        let msg = AnyMessage::new("/cosmos.bank.v1beta1.MsgSend", msg_send().encode_to_vec());
        let decoded = codec.parse_sub_message(&msg).unwrap();
        assert_eq!(decoded.type_name, "cosmos.bank.v1beta1.MsgSend");
        assert_eq!(decoded.value["to_address"], "allo1recipient");
        assert_eq!(decoded.value["amount"][0]["amount"], "2500");
    }

    #[test]
    fn unknown_message_keeps_raw_bytes() {
        let codec = ProtoCodec::new();
        let msg = AnyMessage::new("/emissions.v3.MsgInsertWorkerPayload", vec![1, 2, 3]);
        let decoded = codec.parse_sub_message(&msg).unwrap();
        assert_eq!(decoded.value["@type"], "/emissions.v3.MsgInsertWorkerPayload");
        assert_eq!(decoded.value["value"], "AQID");
    }

    #[test]
    fn typed_event_drops_trailing_mode() {
        let event = AbciEvent::new(
            "emissions.v3.EventScoresSet",
            vec![
                EventAttribute::new("topic_id", "\"7\""),
                EventAttribute::new("scores", "[0.5,0.25]"),
                EventAttribute::new("mode", "EndBlock"),
            ],
        );
        let codec = ProtoCodec::new();
        assert!(codec.is_typed_event(&event));
        let decoded = codec.parse_event(&event).unwrap();
        assert_eq!(decoded.value["topic_id"], "7");
        assert_eq!(decoded.value["scores"][1], 0.25);
        assert!(decoded.value.get("mode").is_none());
    }

    #[test]
    fn event_without_attributes_is_rejected() {
        let err = ProtoCodec::new()
            .parse_event(&AbciEvent::new("emissions.v3.EventScoresSet", vec![]))
            .unwrap_err();
        assert!(matches!(err, CodecError::EmptyEvent { .. }));
    }

    #[test]
    fn non_json_attribute_is_untyped() {
        let event = AbciEvent::new(
            "emissions.v3.EventScoresSet",
            vec![EventAttribute::new("topic_id", "seven")],
        );
        let err = ProtoCodec::new().parse_event(&event).unwrap_err();
        assert!(matches!(err, CodecError::UntypedEvent { .. }));
    }

    #[test]
    fn plain_events_are_not_typed() {
        let codec = ProtoCodec::new();
        assert!(!codec.is_typed_event(&AbciEvent::new("transfer", vec![])));
        assert!(!codec.is_typed_event(&AbciEvent::new("cosmos.lowercase", vec![])));

        let mut strict = ProtoCodec::new().infer_typed_events(false);
        let ev = AbciEvent::new("/emissions.v3.EventRewardsSettled", vec![]);
        assert!(!strict.is_typed_event(&ev));
        strict.register_typed_event("emissions.v3.EventRewardsSettled");
        assert!(strict.is_typed_event(&ev));
    }
}
