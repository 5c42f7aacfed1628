use crate::channel::{Channel, Registry};
use crate::link::Link;
use crate::payload::heartbeat::{Request, NAMESPACE, PING, PONG};
use crate::worker;
use crate::Config;

/// Open the heartbeat channel: every `PING` from the receiver is answered
/// with exactly one `PONG`, and `PONG`s are accepted silently.
pub(crate) fn open(registry: &Registry, link: &Link, config: &Config) -> Channel {
    let channel = registry.open(link, &config.sender_id, &config.receiver_id, NAMESPACE);
    let responder = channel.downgrade();
    channel.on_message(PING, move |_| {
        trace!("heartbeat got PING");
        if let Some(channel) = responder.upgrade() {
            worker::detach(channel.send(&Request::Pong), "heartbeat pong");
        }
    });
    channel.on_message(PONG, |_| trace!("heartbeat got PONG"));
    channel
}
