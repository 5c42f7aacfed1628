use std::time::Duration;

use futures::prelude::*;
use stream_util::{Cancelable, Valve};
use tokio_timer::Interval;

use crate::channel::Channel;
use crate::payload::heartbeat::Request;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Send a `PING` on the heartbeat channel once per `interval`, regardless of
/// whether the receiver answers. Stops when the valve closes or a ping can
/// not be written.
pub(crate) fn task(
    channel: Channel,
    interval: Duration,
    valve: Valve,
) -> impl Future<Item = (), Error = ()> {
    Interval::new_interval(interval)
        .cancel(valve)
        .map_err(|err| warn!("Error on heartbeat interval: {:?}", err))
        .for_each(move |_| {
            trace!("sending heartbeat ping");
            channel
                .send(&Request::Ping)
                .map_err(|err| warn!("Error on heartbeat: {}", err))
        })
        .map(|_| debug!("cast heartbeat stopped"))
}
