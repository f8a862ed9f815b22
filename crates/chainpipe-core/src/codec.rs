//! Decoder abstraction for transactions, sub-messages and events.

use crate::error::CodecError;
use crate::types::{AbciEvent, AnyMessage, Transaction};

/// A decoded domain object, ready to be marshalled to JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMessage {
    /// Fully-qualified type name of the object.
    pub type_name: String,
    pub value: serde_json::Value,
}

impl DecodedMessage {
    pub fn new(type_name: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            type_name: type_name.into(),
            value,
        }
    }
}

/// Turns raw chain data into structured messages.
pub trait Codec: Send + Sync {
    /// Decode raw transaction bytes as found in a block.
    fn parse_transaction(&self, raw: &[u8]) -> Result<Transaction, CodecError>;

    /// Unpack a transaction sub-message.
    fn parse_sub_message(&self, msg: &AnyMessage) -> Result<DecodedMessage, CodecError>;

    /// Decode a typed event into its structured message.
    fn parse_event(&self, event: &AbciEvent) -> Result<DecodedMessage, CodecError>;

    /// Decode an opaque key/value event as a flat attribute map.
    fn parse_untyped_event(&self, event: &AbciEvent) -> Result<DecodedMessage, CodecError> {
        let attrs: serde_json::Map<String, serde_json::Value> = event
            .attributes
            .iter()
            .map(|a| (a.key.clone(), serde_json::Value::String(a.value.clone())))
            .collect();
        Ok(DecodedMessage::new(
            event.kind.clone(),
            serde_json::Value::Object(attrs),
        ))
    }

    /// JSON bytes of a decoded message.
    fn marshal_json(&self, msg: &DecodedMessage) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(&msg.value)?)
    }

    /// Whether the decoder knows the structured schema of this event.
    fn is_typed_event(&self, event: &AbciEvent) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventAttribute;

    struct Nop;

    impl Codec for Nop {
        fn parse_transaction(&self, _raw: &[u8]) -> Result<Transaction, CodecError> {
            Ok(Transaction::default())
        }
        fn parse_sub_message(&self, msg: &AnyMessage) -> Result<DecodedMessage, CodecError> {
            Err(CodecError::UnsupportedType {
                type_url: msg.type_url.clone(),
            })
        }
        fn parse_event(&self, event: &AbciEvent) -> Result<DecodedMessage, CodecError> {
            self.parse_untyped_event(event)
        }
        fn is_typed_event(&self, _event: &AbciEvent) -> bool {
            false
        }
    }

    #[test]
    fn untyped_event_becomes_attribute_map() {
        let ev = AbciEvent::new(
            "transfer",
            vec![
                EventAttribute::new("recipient", "allo1xyz"),
                EventAttribute::new("amount", "10uallo"),
            ],
        );
        let decoded = Nop.parse_untyped_event(&ev).unwrap();
        assert_eq!(decoded.type_name, "transfer");
        assert_eq!(decoded.value["amount"], "10uallo");

        let bytes = Nop.marshal_json(&decoded).unwrap();
        let back: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back["recipient"], "allo1xyz");
    }
}
