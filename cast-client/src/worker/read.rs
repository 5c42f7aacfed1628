use std::io;
use std::sync::{Arc, Weak};

use bytes::BytesMut;
use futures::prelude::*;
use futures_locks::RwLock;
use stream_util::{Cancelable, Valve};

use crate::channel::Registry;
use crate::link::Link;
use crate::{ConnectionState, Shutdown};

/// The dispatch loop: offer every inbound frame to the channel registry.
///
/// Frames are handled one at a time in arrival order and listener callbacks
/// run inline, so a slow callback delays every later frame. The loop ends
/// on EOF, on a transport error, or when the valve closes. On exit the link
/// refuses further frames, the heartbeat and writer are shut down, and the
/// client is left `Disconnected`.
pub(crate) fn task(
    source: impl Stream<Item = BytesMut, Error = io::Error>,
    registry: Arc<Registry>,
    link: Link,
    shutdown: Weak<Shutdown>,
    valve: Valve,
    state: RwLock<ConnectionState>,
) -> impl Future<Item = (), Error = ()> {
    source
        .cancel(valve)
        .for_each(move |frame| {
            registry.dispatch(&frame);
            Ok(())
        })
        .then(move |result| {
            match result {
                Ok(()) => info!("cast connection closed"),
                Err(err) => warn!("Error on read: {:?}", err),
            }
            link.close();
            if let Some(shutdown) = shutdown.upgrade() {
                shutdown.terminate();
            }
            Ok::<_, ()>(())
        })
        .and_then(move |()| state.write())
        .map(|mut state| {
            *state = ConnectionState::Disconnected;
            info!("cast client disconnected");
        })
}
