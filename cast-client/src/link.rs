use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Weak};

use futures::future;
use futures::sync::mpsc::UnboundedSender;
use futures::sync::oneshot;
use futures::Future;

use crate::channel::Registry;
use crate::envelope::{self, Envelope};
use crate::worker::Write;
use crate::Error;

/// Handle on the single connection that every channel shares: the queue
/// into the writer task, the request id generator and a weak reference to
/// the channel registry.
#[derive(Clone, Debug)]
pub(crate) struct Link {
    writer: UnboundedSender<Write>,
    request_id: Arc<AtomicI64>,
    registry: Weak<Registry>,
    open: Arc<AtomicBool>,
}

impl Link {
    pub fn new(writer: UnboundedSender<Write>, registry: &Arc<Registry>) -> Self {
        Self {
            writer,
            request_id: Arc::new(AtomicI64::new(0)),
            registry: Arc::downgrade(registry),
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Refuse every later `send` on all clones of this link. Frames already
    /// queued are left to the writer.
    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    /// Mint the next request id. Ids start at 1 and are unique for the
    /// lifetime of the connection no matter how many callers race.
    pub fn next_request_id(&self) -> i64 {
        self.request_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn registry(&self) -> Option<Arc<Registry>> {
        self.registry.upgrade()
    }

    /// Encode `envelope` and queue it as one frame.
    ///
    /// The frame is queued before this returns, so frames go out in the
    /// order `send` was called. The returned future resolves once the frame
    /// has been written and flushed, or with the transport error that
    /// prevented it. A closed link fails with `Error::Disconnected`.
    pub fn send(&self, envelope: &Envelope) -> impl Future<Item = (), Error = Error> {
        let (ack, written) = oneshot::channel();
        let queued = envelope::encode(envelope).and_then(|frame| {
            if !self.open.load(Ordering::SeqCst) {
                return Err(Error::Disconnected);
            }
            self.writer
                .unbounded_send(Write { frame, ack })
                .map_err(|_| Error::Disconnected)
        });
        future::result(queued).and_then(move |()| {
            written.then(|result| match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => Err(Error::Io(err)),
                Err(_) => Err(Error::Disconnected),
            })
        })
    }
}
