use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::future::{self, Either};
use futures::sync::oneshot;
use futures::Future;
use serde::Serialize;
use tokio_timer::Timeout;

use crate::envelope::{Envelope, Payload};
use crate::link::Link;
use crate::payload::{Header, RequestId};
use crate::Error;

pub(crate) mod connection;
pub(crate) mod heartbeat;
mod registry;

pub(crate) use self::registry::Registry;

pub const DEFAULT_DESTINATION_ID: &str = "receiver-0";
pub const DEFAULT_SENDER_ID: &str = "sender-0";

type Callback = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// Registry handle of a channel. Channels compare equal only to clones of
/// themselves, even when two channels share an identity triple.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChannelId(u64);

struct Listener {
    kind: String,
    callback: Callback,
}

struct Inner {
    id: ChannelId,
    source_id: String,
    destination_id: String,
    namespace: String,
    link: Link,
    in_flight: Mutex<HashMap<i64, oneshot::Sender<Envelope>>>,
    listeners: Mutex<Vec<Listener>>,
}

/// A logical conversation over the shared connection, scoped by
/// `(source_id, destination_id, namespace)`.
///
/// Outbound envelopes are stamped with the channel's triple. Inbound
/// envelopes are accepted when they travel the opposite direction: their
/// source is this channel's destination and vice versa. Cloning a channel
/// yields another handle on the same conversation.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<Inner>,
}

/// A non-owning handle on a [`Channel`], for listeners that need to reply on
/// the channel they are registered with.
#[derive(Clone)]
pub struct WeakChannel {
    inner: Weak<Inner>,
}

impl WeakChannel {
    pub fn upgrade(&self) -> Option<Channel> {
        self.inner.upgrade().map(|inner| Channel { inner })
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Channel {
    fn new(
        id: ChannelId,
        link: Link,
        source_id: &str,
        destination_id: &str,
        namespace: &str,
    ) -> Self {
        let inner = Inner {
            id,
            source_id: source_id.to_owned(),
            destination_id: destination_id.to_owned(),
            namespace: namespace.to_owned(),
            link,
            in_flight: Mutex::default(),
            listeners: Mutex::default(),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn id(&self) -> ChannelId {
        self.inner.id
    }

    pub fn source_id(&self) -> &str {
        &self.inner.source_id
    }

    pub fn destination_id(&self) -> &str {
        &self.inner.destination_id
    }

    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    pub fn downgrade(&self) -> WeakChannel {
        WeakChannel {
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn envelope(&self, payload: Payload) -> Envelope {
        Envelope::new(
            &self.inner.source_id,
            &self.inner.destination_id,
            &self.inner.namespace,
            payload,
        )
    }

    /// Serialize `payload` as JSON and send it on this channel.
    ///
    /// The frame is queued immediately; dropping the returned future does
    /// not cancel it. The future resolves once the frame is written.
    pub fn send<T>(&self, payload: &T) -> impl Future<Item = (), Error = Error>
    where
        T: Serialize + ?Sized,
    {
        match serde_json::to_string(payload) {
            Ok(payload) => Either::A(self.inner.link.send(&self.envelope(Payload::Utf8(payload)))),
            Err(err) => Either::B(future::err(Error::Json(err))),
        }
    }

    pub fn send_binary(&self, payload: Vec<u8>) -> impl Future<Item = (), Error = Error> {
        self.inner.link.send(&self.envelope(Payload::Binary(payload)))
    }

    /// Subscribe `callback` to every inbound message of type `kind`.
    ///
    /// Subscriptions are never removed. All subscriptions for a type run in
    /// registration order, inline on the connection's dispatch loop.
    pub fn on_message<F>(&self, kind: &str, callback: F)
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        let listener = Listener {
            kind: kind.to_owned(),
            callback: Arc::new(callback),
        };
        lock(&self.inner.listeners).push(listener);
    }

    /// Send `payload` with a freshly minted request id and wait for the
    /// reply carrying the same id.
    ///
    /// The reply slot is registered before the frame is queued. The timeout
    /// starts once the frame is written. Whichever way the future ends,
    /// including being dropped, the reply slot is released.
    pub fn request<T>(
        &self,
        mut payload: T,
        timeout: Duration,
    ) -> impl Future<Item = Envelope, Error = Error>
    where
        T: RequestId + Serialize,
    {
        let request_id = self.inner.link.next_request_id();
        payload.set_request_id(request_id);
        let (reply, slot) = oneshot::channel();
        lock(&self.inner.in_flight).insert(request_id, reply);
        let pending = PendingReply {
            request_id,
            channel: self.inner.clone(),
        };
        trace!(
            "request {} on {} to {}",
            request_id,
            self.inner.namespace,
            self.inner.destination_id
        );
        let destination = self.inner.destination_id.clone();

        self.send(&payload).then(move |sent| match sent {
            Ok(()) => Either::A(Timeout::new(slot, timeout).then(move |result| {
                drop(pending);
                match result {
                    Ok(reply) => Ok(reply),
                    Err(ref err) if err.is_elapsed() => Err(Error::RequestTimeout {
                        request_id,
                        destination,
                        timeout,
                    }),
                    Err(err) => match err.into_timer() {
                        Some(err) => Err(Error::Timer(err)),
                        None => Err(Error::RequestCanceled(request_id)),
                    },
                }
            })),
            Err(err) => {
                drop(pending);
                Either::B(future::err(err))
            }
        })
    }

    /// Remove this channel from the client's registry. Outstanding requests
    /// are not canceled; they run into their timeout.
    pub fn close(&self) {
        match self.inner.link.registry() {
            Some(registry) => registry.remove(self),
            None => debug!("closing channel {:?} after its client is gone", self),
        }
    }

    fn accepts(&self, envelope: &Envelope) -> bool {
        envelope.source_id() == self.inner.destination_id
            && envelope.destination_id() == self.inner.source_id
            && envelope.namespace() == self.inner.namespace
    }

    /// Offer an inbound envelope to this channel. Returns whether the
    /// channel handled it.
    ///
    /// Broadcast envelopes bypass the identity check and never complete a
    /// request. A correlated reply completes its request and is then also
    /// offered to listeners of its type. A reply whose request id has no
    /// outstanding request is dropped.
    pub(crate) fn deliver(&self, envelope: &Envelope, header: &Header) -> bool {
        let broadcast = envelope.is_broadcast();
        if !broadcast && !self.accepts(envelope) {
            return false;
        }

        let mut delivered = false;
        if let (false, Some(request_id)) = (broadcast, header.correlation_id()) {
            let reply = lock(&self.inner.in_flight).remove(&request_id);
            match reply {
                Some(reply) => {
                    if reply.send(envelope.clone()).is_err() {
                        debug!("reply to request {} arrived after it was abandoned", request_id);
                    }
                    delivered = true;
                }
                None => {
                    warn!(
                        "Unknown incoming response id {} from {} on {}",
                        request_id,
                        envelope.source_id(),
                        envelope.namespace()
                    );
                    return false;
                }
            }
        }

        let kind = match header.kind() {
            Some(kind) => kind,
            None => {
                if !delivered {
                    warn!(
                        "No message type, dropping message on {}: {:?}",
                        envelope.namespace(),
                        envelope.payload()
                    );
                }
                return delivered;
            }
        };

        let callbacks = lock(&self.inner.listeners)
            .iter()
            .filter(|listener| listener.kind == kind)
            .map(|listener| listener.callback.clone())
            .collect::<Vec<_>>();
        for callback in callbacks {
            callback(envelope);
            delivered = true;
        }
        delivered
    }

    #[cfg(test)]
    pub(crate) fn in_flight(&self) -> usize {
        lock(&self.inner.in_flight).len()
    }
}

impl PartialEq for Channel {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Channel {}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.inner.id)
            .field("source_id", &self.inner.source_id)
            .field("destination_id", &self.inner.destination_id)
            .field("namespace", &self.inner.namespace)
            .finish()
    }
}

impl fmt::Debug for WeakChannel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.upgrade() {
            Some(channel) => write!(f, "WeakChannel({:?})", channel.id()),
            None => write!(f, "WeakChannel(dropped)"),
        }
    }
}

/// Releases a request's reply slot when the request finishes or is dropped.
struct PendingReply {
    request_id: i64,
    channel: Arc<Inner>,
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        if lock(&self.channel.in_flight)
            .remove(&self.request_id)
            .is_some()
        {
            trace!("released reply slot for request {}", self.request_id);
        }
    }
}

#[cfg(test)]
mod tests;
