//! Status controllers for cast receivers built on [`cast_client`].
//!
//! [`ReceiverController`] tracks the platform receiver: running apps and
//! device volume. [`MediaController`] tracks media sessions on an app
//! transport. Both forward status updates on an unbounded stream and expose
//! request/reply helpers that resolve with the receiver's reply.

#[macro_use]
extern crate log;

pub mod media;
pub mod receiver;

pub use self::media::MediaController;
pub use self::receiver::ReceiverController;
