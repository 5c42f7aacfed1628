use std::io;

use bytes::Bytes;
use futures::prelude::*;
use futures::sync::oneshot;

/// One encoded frame queued for the writer along with the slot that
/// receives the outcome of writing it.
#[derive(Debug)]
pub(crate) struct Write {
    pub frame: Bytes,
    pub ack: oneshot::Sender<io::Result<()>>,
}

/// Write queued frames to the transport one at a time, in queue order.
///
/// Each frame is flushed before its sender is acknowledged. The first
/// transport error is handed to the sender of the failing frame and stops
/// the writer; frames still queued are dropped and their senders observe a
/// closed connection.
pub(crate) fn task(
    sink: impl Sink<SinkItem = Bytes, SinkError = io::Error>,
    writes: impl Stream<Item = Write, Error = ()>,
) -> impl Future<Item = (), Error = ()> {
    writes
        .fold(sink, |sink, Write { frame, ack }| {
            sink.send(frame).then(move |result| match result {
                Ok(sink) => {
                    let _ = ack.send(Ok(()));
                    Ok(sink)
                }
                Err(err) => {
                    warn!("Error on sink write: {:?}", err);
                    let _ = ack.send(Err(err));
                    Err(())
                }
            })
        })
        .map(|_| debug!("cast writer drained"))
}
