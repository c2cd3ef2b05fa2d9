use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::{ActorId, ACK_MARKER};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("packet is not a record")]
    NotARecord,

    #[error("packet missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid mode: {0}")]
    InvalidMode(String),

    #[error("invalid datatype for sender_id")]
    InvalidSenderId,

    #[error("receiver_id(s) required")]
    MissingReceivers,

    #[error("receiver_id must be a list of ids")]
    ReceiverIdNotList,

    #[error("invalid receiver id: {0}")]
    InvalidReceiverId(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Broadcast,
    Multicast,
    Unicast,
}

impl FromStr for Mode {
    type Err = PacketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "broadcast" => Ok(Mode::Broadcast),
            "multicast" => Ok(Mode::Multicast),
            "unicast" => Ok(Mode::Unicast),
            other => Err(PacketError::InvalidMode(other.to_owned())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Broadcast => "broadcast",
            Mode::Multicast => "multicast",
            Mode::Unicast => "unicast",
        };
        f.write_str(name)
    }
}

/// Application payload. The string [`ACK_MARKER`] is reserved for acknowledgements.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Payload {
    Ack,
    Data(String),
}

impl Payload {
    pub fn is_ack(&self) -> bool {
        matches!(self, Payload::Ack)
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        if s == ACK_MARKER {
            Payload::Ack
        } else {
            Payload::Data(s)
        }
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::from(s.to_owned())
    }
}

impl From<Payload> for String {
    fn from(payload: Payload) -> Self {
        match payload {
            Payload::Ack => ACK_MARKER.to_owned(),
            Payload::Data(s) => s,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    pub sender_id: ActorId,
    /// Addressees. Empty only for broadcasts.
    #[serde(rename = "receiver_id")]
    pub receiver_ids: Vec<ActorId>,
    pub mode: Mode,
    pub payload: Payload,
}

impl Packet {
    pub fn broadcast(sender: impl Into<ActorId>, payload: impl Into<Payload>) -> Self {
        Self {
            sender_id: sender.into(),
            receiver_ids: Vec::new(),
            mode: Mode::Broadcast,
            payload: payload.into(),
        }
    }

    pub fn unicast(
        sender: impl Into<ActorId>,
        receiver: impl Into<ActorId>,
        payload: impl Into<Payload>,
    ) -> Self {
        Self {
            sender_id: sender.into(),
            receiver_ids: vec![receiver.into()],
            mode: Mode::Unicast,
            payload: payload.into(),
        }
    }

    pub fn multicast<I, A>(
        sender: impl Into<ActorId>,
        receivers: I,
        payload: impl Into<Payload>,
    ) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<ActorId>,
    {
        Self {
            sender_id: sender.into(),
            receiver_ids: receivers.into_iter().map(Into::into).collect(),
            mode: Mode::Multicast,
            payload: payload.into(),
        }
    }

    /// Acknowledgement from `sender` back to the originator of a received packet.
    pub fn ack(sender: impl Into<ActorId>, receiver: impl Into<ActorId>) -> Self {
        Self::unicast(sender, receiver, Payload::Ack)
    }

    pub fn validate(&self) -> Result<(), PacketError> {
        if self.mode != Mode::Broadcast && self.receiver_ids.is_empty() {
            return Err(PacketError::MissingReceivers);
        }
        Ok(())
    }

    pub fn is_ack(&self) -> bool {
        self.payload.is_ack()
    }

    /// Unicast and multicast data packets are acknowledged; broadcasts and ACKs are not.
    pub fn requires_ack(&self) -> bool {
        self.mode != Mode::Broadcast && !self.is_ack()
    }

    pub fn is_addressed_to(&self, id: &ActorId) -> bool {
        if self.mode == Mode::Broadcast && &self.sender_id != id {
            return true;
        }
        self.receiver_ids.contains(id)
    }
}

fn take_field(record: &mut Map<String, Value>, field: &'static str) -> Result<Value, PacketError> {
    record.remove(field).ok_or(PacketError::MissingField(field))
}

fn receiver_from_value(value: Value) -> Result<ActorId, PacketError> {
    match value {
        Value::String(id) => Ok(ActorId::from(id)),
        Value::Number(n) => Ok(ActorId::from(n.to_string())),
        other => Err(PacketError::InvalidReceiverId(other.to_string())),
    }
}

/// Parses the loosely-typed wire record `{sender_id, receiver_id, mode, payload}`.
///
/// A scalar `receiver_id` is normalized into a one-element list. A payload
/// that is not a JSON string is kept as its compact JSON text, so `{"k":1}`
/// re-serializes as the string `"{\"k\":1}"`.
impl TryFrom<Value> for Packet {
    type Error = PacketError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(mut record) = value else {
            return Err(PacketError::NotARecord);
        };

        for field in ["mode", "sender_id", "receiver_id"] {
            if !record.contains_key(field) {
                return Err(PacketError::MissingField(field));
            }
        }

        let mode = match take_field(&mut record, "mode")? {
            Value::String(s) => s.parse()?,
            other => return Err(PacketError::InvalidMode(other.to_string())),
        };

        let sender_id = match take_field(&mut record, "sender_id")? {
            Value::String(s) => ActorId::from(s),
            _ => return Err(PacketError::InvalidSenderId),
        };

        let receiver_ids = match take_field(&mut record, "receiver_id")? {
            Value::Null if mode != Mode::Broadcast => return Err(PacketError::MissingReceivers),
            Value::Array(items) => items
                .into_iter()
                .map(receiver_from_value)
                .collect::<Result<Vec<_>, _>>()?,
            scalar @ (Value::String(_) | Value::Number(_)) => vec![receiver_from_value(scalar)?],
            _ => return Err(PacketError::ReceiverIdNotList),
        };

        let payload = match take_field(&mut record, "payload")? {
            Value::String(s) => Payload::from(s),
            other => Payload::Data(other.to_string()),
        };

        let packet = Packet {
            sender_id,
            receiver_ids,
            mode,
            payload,
        };
        packet.validate()?;
        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unicast_without_receivers_rejected() {
        let result = Packet::try_from(json!({
            "mode": "unicast",
            "sender_id": "A",
            "receiver_id": null,
            "payload": "hello",
        }));
        assert_eq!(result, Err(PacketError::MissingReceivers));

        let result = Packet::try_from(json!({
            "mode": "multicast",
            "sender_id": "A",
            "receiver_id": [],
            "payload": "hello",
        }));
        assert_eq!(result, Err(PacketError::MissingReceivers));
    }

    #[test]
    fn test_broadcast_with_empty_receivers_accepted() {
        let packet = Packet::try_from(json!({
            "mode": "broadcast",
            "sender_id": "A",
            "receiver_id": [],
            "payload": "beacon",
        }))
        .unwrap();
        assert_eq!(packet, Packet::broadcast("A", "beacon"));
    }

    #[test]
    fn test_missing_fields_reported_in_order() {
        let result = Packet::try_from(json!({ "sender_id": "A", "payload": "x" }));
        assert_eq!(result, Err(PacketError::MissingField("mode")));

        let result = Packet::try_from(json!({ "mode": "unicast", "receiver_id": ["B"] }));
        assert_eq!(result, Err(PacketError::MissingField("sender_id")));

        let result = Packet::try_from(json!({ "mode": "unicast", "sender_id": "A" }));
        assert_eq!(result, Err(PacketError::MissingField("receiver_id")));

        let result = Packet::try_from(json!({
            "mode": "unicast",
            "sender_id": "A",
            "receiver_id": ["B"],
        }));
        assert_eq!(result, Err(PacketError::MissingField("payload")));
    }

    #[test]
    fn test_bad_mode_and_sender_rejected() {
        let result = Packet::try_from(json!({
            "mode": "anycast",
            "sender_id": "A",
            "receiver_id": ["B"],
            "payload": "x",
        }));
        assert_eq!(result, Err(PacketError::InvalidMode("anycast".into())));

        let result = Packet::try_from(json!({
            "mode": "unicast",
            "sender_id": 7,
            "receiver_id": ["B"],
            "payload": "x",
        }));
        assert_eq!(result, Err(PacketError::InvalidSenderId));

        assert_eq!(Packet::try_from(json!("A")), Err(PacketError::NotARecord));
    }

    #[test]
    fn test_scalar_receiver_normalized() {
        let packet = Packet::try_from(json!({
            "mode": "unicast",
            "sender_id": "A",
            "receiver_id": 3,
            "payload": "x",
        }))
        .unwrap();
        assert_eq!(packet.receiver_ids, vec![ActorId::from("3")]);

        let packet = Packet::try_from(json!({
            "mode": "unicast",
            "sender_id": "A",
            "receiver_id": "B",
            "payload": "x",
        }))
        .unwrap();
        assert_eq!(packet.receiver_ids, vec![ActorId::from("B")]);

        let result = Packet::try_from(json!({
            "mode": "unicast",
            "sender_id": "A",
            "receiver_id": { "id": "B" },
            "payload": "x",
        }));
        assert_eq!(result, Err(PacketError::ReceiverIdNotList));
    }

    #[test]
    fn test_ack_marker_and_addressing() {
        let ack = Packet::try_from(json!({
            "mode": "unicast",
            "sender_id": "B",
            "receiver_id": ["A"],
            "payload": "ACK",
        }))
        .unwrap();
        assert!(ack.is_ack());
        assert!(!ack.requires_ack());
        assert_eq!(ack, Packet::ack("B", "A"));

        let a = ActorId::from("A");
        let b = ActorId::from("B");
        let beacon = Packet::broadcast("A", "beacon");
        assert!(!beacon.is_addressed_to(&a));
        assert!(beacon.is_addressed_to(&b));
        assert!(!beacon.requires_ack());

        let data = Packet::multicast("A", ["B", "C"], "data");
        assert!(data.is_addressed_to(&b));
        assert!(!data.is_addressed_to(&a));
        assert!(data.requires_ack());
    }

    #[test]
    fn test_non_string_payload_kept_as_json_text() {
        let packet = Packet::try_from(json!({
            "mode": "broadcast",
            "sender_id": "A",
            "receiver_id": [],
            "payload": { "k": 1 },
        }))
        .unwrap();
        assert_eq!(packet.payload, Payload::Data(r#"{"k":1}"#.to_owned()));

        let json = serde_json::to_value(&packet).unwrap();
        assert_eq!(json["payload"], r#"{"k":1}"#);
    }

    #[test]
    fn test_payload_serde_uses_marker() {
        let json = serde_json::to_value(Packet::ack("B", "A")).unwrap();
        assert_eq!(json["payload"], "ACK");
        assert_eq!(json["mode"], "unicast");
        assert_eq!(json["receiver_id"], json!(["A"]));
    }
}
