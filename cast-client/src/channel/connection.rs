use crate::channel::{Channel, Registry};
use crate::link::Link;
use crate::payload::connection::{Request, CLOSE, NAMESPACE};
use crate::worker;
use crate::Config;

/// Open the virtual connection to the receiver platform and send `CONNECT`.
///
/// The receiver does not answer a `CONNECT`; nothing waits on it.
pub(crate) fn open(registry: &Registry, link: &Link, config: &Config) -> Channel {
    let channel = registry.open(link, &config.sender_id, &config.receiver_id, NAMESPACE);
    channel.on_message(CLOSE, |envelope| {
        warn!("cast connection closed by {}", envelope.source_id());
    });
    worker::detach(channel.send(&Request::Connect), "connect");
    channel
}
