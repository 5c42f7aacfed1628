//! The heartbeat channel keeps the connection alive with PING/PONG exchanges.

use serde_derive::{Deserialize, Serialize};

pub const NAMESPACE: &str = "urn:x-cast:com.google.cast.tp.heartbeat";

pub const PING: &str = "PING";
pub const PONG: &str = "PONG";

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    Ping,
    Pong,
}
