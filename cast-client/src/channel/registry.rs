use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::channel::{lock, Channel, ChannelId};
use crate::envelope;
use crate::link::Link;

/// The live channels of one client, in registration order.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    channels: Mutex<Vec<Channel>>,
    next_id: AtomicU64,
}

impl Registry {
    pub fn open(
        &self,
        link: &Link,
        source_id: &str,
        destination_id: &str,
        namespace: &str,
    ) -> Channel {
        let id = ChannelId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let channel = Channel::new(id, link.clone(), source_id, destination_id, namespace);
        let mut channels = lock(&self.channels);
        channels.push(channel.clone());
        debug!("opened {:?}, {} channels registered", channel, channels.len());
        channel
    }

    pub fn remove(&self, channel: &Channel) {
        let mut channels = lock(&self.channels);
        match channels.iter().position(|registered| registered == channel) {
            Some(index) => {
                channels.remove(index);
                debug!("closed {:?}, {} channels registered", channel, channels.len());
            }
            None => debug!("{:?} is not registered", channel),
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.channels).len()
    }

    /// Decode one inbound frame and offer it to every registered channel in
    /// registration order. Returns whether any channel handled it.
    ///
    /// The registry is snapshotted first so listeners may open or close
    /// channels while the frame is being dispatched.
    pub fn dispatch(&self, frame: &[u8]) -> bool {
        let envelope = match envelope::decode(frame) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!("Failed to decode cast envelope: {}", err);
                return false;
            }
        };
        let header = match envelope.header() {
            Ok(header) => header,
            Err(err) => {
                warn!(
                    "Failed to decode payload header on {}: {}",
                    envelope.namespace(),
                    err
                );
                return false;
            }
        };

        let channels = lock(&self.channels).clone();
        trace!(
            "channels: {} got message in namespace {}",
            channels.len(),
            envelope.namespace()
        );
        let mut delivered = false;
        for channel in &channels {
            delivered |= channel.deliver(&envelope, &header);
        }
        if !delivered {
            debug!("Lost message (no channel is listening): {:?}", envelope);
        }
        delivered
    }
}
