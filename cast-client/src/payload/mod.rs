//! JSON payloads carried in the `payload_utf8` field of an envelope.
//!
//! Every payload is a JSON object with a `type` field naming the message and,
//! for correlated request/response exchanges, a `requestId`. The
//! [`Header`] type decodes just those two fields from any payload.

use serde_derive::{Deserialize, Serialize};

pub mod connection;
pub mod heartbeat;

/// A `0` request id is reserved for "spontaneous" messages from the receiver
/// https://developers.google.com/cast/docs/reference/messages#MediaMess
pub const SPONTANEOUS_REQUEST_ID: i64 = 0;

/// Payloads that can take part in a correlated request.
///
/// `Channel::request` stamps a freshly minted id into the payload before it
/// is serialized, so any request type must expose a settable `requestId`.
pub trait RequestId {
    fn request_id(&self) -> Option<i64>;

    fn set_request_id(&mut self, request_id: i64);
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(
        rename = "requestId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub request_id: Option<i64>,
}

impl Header {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_owned(),
            request_id: None,
        }
    }

    /// Message type used for listener dispatch, `None` if absent or empty.
    pub fn kind(&self) -> Option<&str> {
        if self.kind.is_empty() {
            None
        } else {
            Some(&self.kind)
        }
    }

    /// Request id of a reply that may complete an outstanding request.
    /// Spontaneous messages are never correlated.
    pub fn correlation_id(&self) -> Option<i64> {
        self.request_id
            .filter(|&request_id| request_id != SPONTANEOUS_REQUEST_ID)
    }
}

impl RequestId for Header {
    fn request_id(&self) -> Option<i64> {
        self.request_id
    }

    fn set_request_id(&mut self, request_id: i64) {
        self.request_id = Some(request_id);
    }
}
