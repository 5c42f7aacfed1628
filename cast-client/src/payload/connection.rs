//! The connection channel manages virtual connections to cast transports.

use serde_derive::{Deserialize, Serialize};

pub const NAMESPACE: &str = "urn:x-cast:com.google.cast.tp.connection";

pub const CONNECT: &str = "CONNECT";
pub const CLOSE: &str = "CLOSE";

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    Connect,
    Close,
}
