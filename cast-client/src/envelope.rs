use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::payload::Header;
use crate::proto::{CastMessage, CastMessage_PayloadType, CastMessage_ProtocolVersion};
use crate::Error;

/// Destination id that addresses every local channel.
pub const BROADCAST_DESTINATION_ID: &str = "*";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    Utf8(String),
    Binary(Vec<u8>),
}

/// One protocol message as carried in a single frame.
///
/// Envelopes are immutable once built. The protocol version is not stored:
/// this client only speaks `CASTV2_1_0` and stamps it on encode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    source_id: String,
    destination_id: String,
    namespace: String,
    payload: Payload,
}

impl Envelope {
    pub fn new(source_id: &str, destination_id: &str, namespace: &str, payload: Payload) -> Self {
        Self {
            source_id: source_id.to_owned(),
            destination_id: destination_id.to_owned(),
            namespace: namespace.to_owned(),
            payload,
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn destination_id(&self) -> &str {
        &self.destination_id
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn payload_utf8(&self) -> Option<&str> {
        match self.payload {
            Payload::Utf8(ref payload) => Some(payload),
            Payload::Binary(_) => None,
        }
    }

    pub fn is_broadcast(&self) -> bool {
        self.destination_id == BROADCAST_DESTINATION_ID
    }

    /// Decode the routing header embedded in a JSON string payload.
    pub fn header(&self) -> Result<Header, Error> {
        let payload = self.payload_utf8().ok_or(Error::BinaryPayload)?;
        serde_json::from_str(payload).map_err(Error::MalformedHeader)
    }

    /// Decode the full JSON string payload into a typed value.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let payload = self.payload_utf8().ok_or(Error::BinaryPayload)?;
        serde_json::from_str(payload).map_err(Error::from)
    }
}

/// Serialize an envelope as a `CastMessage` protobuf, ready to be framed.
pub fn encode(envelope: &Envelope) -> Result<Bytes, Error> {
    let mut message = CastMessage::new();
    message.set_protocol_version(CastMessage_ProtocolVersion::CASTV2_1_0);
    message.set_source_id(envelope.source_id.clone());
    message.set_destination_id(envelope.destination_id.clone());
    message.set_namespace(envelope.namespace.clone());
    match envelope.payload {
        Payload::Utf8(ref payload) => {
            message.set_payload_type(CastMessage_PayloadType::STRING);
            message.set_payload_utf8(payload.clone());
        }
        Payload::Binary(ref payload) => {
            message.set_payload_type(CastMessage_PayloadType::BINARY);
            message.set_payload_binary(payload.clone());
        }
    }
    let buf = protobuf::Message::write_to_bytes(&message)?;
    Ok(Bytes::from(buf))
}

/// Parse one frame as a `CastMessage`. Fails with `MalformedEnvelope` if the
/// frame is not a complete serialization or its payload field does not match
/// its declared payload type.
pub fn decode(frame: &[u8]) -> Result<Envelope, Error> {
    let mut message = protobuf::parse_from_bytes::<CastMessage>(frame)
        .map_err(|err| Error::MalformedEnvelope(err.to_string()))?;
    let payload = match message.get_payload_type() {
        CastMessage_PayloadType::STRING if message.has_payload_utf8() => {
            Payload::Utf8(message.take_payload_utf8())
        }
        CastMessage_PayloadType::BINARY if message.has_payload_binary() => {
            Payload::Binary(message.take_payload_binary())
        }
        payload_type => {
            return Err(Error::MalformedEnvelope(format!(
                "{:?} payload type without a matching payload",
                payload_type
            )))
        }
    };
    Ok(Envelope {
        source_id: message.take_source_id(),
        destination_id: message.take_destination_id(),
        namespace: message.take_namespace(),
        payload,
    })
}
