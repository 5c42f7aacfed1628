use futures::Future;
use tokio_executor::{DefaultExecutor, Executor};

mod heartbeat;
mod read;
mod write;

pub(crate) use self::heartbeat::task as heartbeat;
pub use self::heartbeat::HEARTBEAT_INTERVAL;
pub(crate) use self::read::task as read;
pub(crate) use self::write::task as write;
pub(crate) use self::write::Write;

/// Run `future` in the background on the current executor, logging its
/// error under `context`. Outside an executor the future is dropped; frames
/// sent by a `Channel` are queued before its future is returned, so they
/// still go out.
pub fn detach<F>(future: F, context: &'static str)
where
    F: Future<Item = (), Error = crate::Error> + Send + 'static,
{
    let task = future.map_err(move |err| warn!("Error on {}: {}", context, err));
    if let Err(err) = DefaultExecutor::current().spawn(Box::new(task)) {
        debug!("not awaiting {}, no executor available: {:?}", context, err);
    }
}
