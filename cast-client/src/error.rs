use std::error;
use std::fmt;
use std::io;
use std::time::Duration;

use protobuf::ProtobufError;

#[derive(Debug)]
pub enum Error {
    /// Dial, read or write failure on the underlying stream.
    Io(io::Error),
    Tls(native_tls::Error),
    /// A payload could not be serialized to or parsed from JSON.
    Json(serde_json::Error),
    /// An envelope could not be serialized. Never expected for envelopes
    /// built by this crate.
    Protobuf(ProtobufError),
    /// A frame that is not a valid `CastMessage` serialization.
    MalformedEnvelope(String),
    /// A string payload that is not a JSON object with a payload header.
    MalformedHeader(serde_json::Error),
    /// Typed JSON decoding was requested on a binary payload.
    BinaryPayload,
    RequestTimeout {
        request_id: i64,
        destination: String,
        timeout: Duration,
    },
    /// The reply slot for a request was dropped before a reply arrived.
    RequestCanceled(i64),
    /// The connection to the receiver is gone; no frames can be written.
    Disconnected,
    Timer(tokio_timer::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "cast transport error: {}", err),
            Error::Tls(err) => write!(f, "cast TLS error: {}", err),
            Error::Json(err) => write!(f, "cast payload JSON error: {}", err),
            Error::Protobuf(err) => write!(f, "cast envelope encode error: {}", err),
            Error::MalformedEnvelope(reason) => write!(f, "malformed cast envelope: {}", reason),
            Error::MalformedHeader(err) => write!(f, "malformed payload header: {}", err),
            Error::BinaryPayload => write!(f, "envelope carries a binary payload"),
            Error::RequestTimeout {
                request_id,
                destination,
                timeout,
            } => write!(
                f,
                "call to cast channel {}, id {} timed out after {:?}",
                destination, request_id, timeout
            ),
            Error::RequestCanceled(request_id) => {
                write!(f, "request {} canceled before a reply arrived", request_id)
            }
            Error::Disconnected => write!(f, "cast connection closed"),
            Error::Timer(err) => write!(f, "cast timer error: {}", err),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Tls(err) => Some(err),
            Error::Json(err) | Error::MalformedHeader(err) => Some(err),
            Error::Protobuf(err) => Some(err),
            Error::Timer(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<native_tls::Error> for Error {
    fn from(err: native_tls::Error) -> Self {
        Error::Tls(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<ProtobufError> for Error {
    fn from(err: ProtobufError) -> Self {
        Error::Protobuf(err)
    }
}

impl Error {
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::RequestTimeout { .. } => true,
            _ => false,
        }
    }
}
