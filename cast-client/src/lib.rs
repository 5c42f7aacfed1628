//! Client for the Google Cast v2 device control protocol.
//!
//! A [`Client`] owns one TLS stream to a receiver and multiplexes any number
//! of [`Channel`]s over it. Three tasks run on the ambient tokio executor
//! for the lifetime of a connection: the dispatch loop that routes inbound
//! frames to channels, the writer that serializes outbound frames, and the
//! heartbeat that pings the receiver every five seconds.

#[macro_use]
extern crate log;

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{self, Either};
use futures::sync::mpsc::unbounded;
use futures::{Future, Stream};
use futures_locks::RwLock;
use stream_util::{self, Drainable, Trigger};
use tokio_codec::Framed;
use tokio_io::{AsyncRead, AsyncWrite};
use tokio_tcp::TcpStream;
use tokio_tls::{TlsConnector, TlsStream};

mod channel;
mod codec;
pub mod envelope;
mod error;
mod link;
pub mod payload;
#[allow(clippy::all, clippy::pedantic)]
mod proto;
mod worker;

pub use self::channel::{Channel, ChannelId, WeakChannel, DEFAULT_DESTINATION_ID, DEFAULT_SENDER_ID};
pub use self::codec::{FrameCodec, FRAME_MAX_LENGTH};
pub use self::envelope::{Envelope, Payload, BROADCAST_DESTINATION_ID};
pub use self::error::Error;
pub use self::worker::{detach, HEARTBEAT_INTERVAL};

use self::channel::{lock, Registry};
use self::link::Link;

#[derive(Clone, Debug)]
pub struct Config {
    /// Period of the heartbeat `PING`.
    pub heartbeat_interval: Duration,
    /// Source id of the built-in connection and heartbeat channels.
    pub sender_id: String,
    /// Destination id of the built-in connection and heartbeat channels.
    pub receiver_id: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            heartbeat_interval: HEARTBEAT_INTERVAL,
            sender_id: DEFAULT_SENDER_ID.to_owned(),
            receiver_id: DEFAULT_DESTINATION_ID.to_owned(),
        }
    }
}

/// Lifecycle of a client's connection. `Disconnected` is terminal: the
/// client never reconnects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    /// The `CONNECT` handshake has been queued.
    Connected,
    /// The dispatch loop and heartbeat are running.
    Running,
    Disconnected,
}

/// Owner of a client's shutdown trigger. The trigger fires once: on
/// `Client::shutdown`, when the dispatch loop ends, or when the last client
/// handle is dropped.
#[derive(Debug)]
pub(crate) struct Shutdown(Mutex<Option<Trigger>>);

impl Shutdown {
    /// Returns whether this call fired the trigger.
    pub fn terminate(&self) -> bool {
        let trigger = lock(&self.0).take();
        match trigger {
            Some(trigger) => {
                trigger.terminate();
                true
            }
            None => false,
        }
    }
}

impl Drop for Shutdown {
    fn drop(&mut self) {
        if self.terminate() {
            debug!("last cast client handle dropped, shutting down");
        }
    }
}

/// Handle on one cast connection. Clones share the connection; dropping the
/// last clone shuts it down.
#[derive(Clone)]
pub struct Client {
    link: Link,
    registry: Arc<Registry>,
    state: RwLock<ConnectionState>,
    shutdown: Arc<Shutdown>,
    connection: Channel,
    heartbeat: Channel,
}

impl Client {
    /// Run the cast protocol over an established stream.
    ///
    /// Must be polled on a tokio executor: resolving the returned future
    /// spawns the writer, the dispatch loop and the heartbeat, and sends the
    /// `CONNECT` handshake.
    pub fn from_stream<S>(stream: S, config: Config) -> impl Future<Item = Self, Error = Error>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        future::lazy(move || {
            let (sink, source) = Framed::new(stream, codec::FrameCodec::default()).split();
            let (trigger, valve) = stream_util::valve();
            let (writer, writes) = unbounded();
            tokio_executor::spawn(worker::write(sink, writes.drain(valve.clone())));

            let registry = Arc::new(Registry::default());
            let link = Link::new(writer, &registry);
            let state = RwLock::new(ConnectionState::Connecting);
            let connection = channel::connection::open(&registry, &link, &config);
            let heartbeat = channel::heartbeat::open(&registry, &link, &config);
            let client = Self {
                link,
                registry,
                state,
                shutdown: Arc::new(Shutdown(Mutex::new(Some(trigger)))),
                connection,
                heartbeat,
            };

            client.transition(ConnectionState::Connected).and_then(move |()| {
                tokio_executor::spawn(worker::read(
                    source,
                    client.registry.clone(),
                    client.link.clone(),
                    Arc::downgrade(&client.shutdown),
                    valve.clone(),
                    client.state.clone(),
                ));
                tokio_executor::spawn(worker::heartbeat(
                    client.heartbeat.clone(),
                    config.heartbeat_interval,
                    valve,
                ));
                client
                    .transition(ConnectionState::Running)
                    .map(move |()| client)
            })
        })
    }

    fn transition(&self, next: ConnectionState) -> impl Future<Item = (), Error = Error> {
        self.state
            .write()
            .map(move |mut state| {
                debug!("cast client {:?} -> {:?}", *state, next);
                // A client that already lost its connection stays disconnected.
                if *state != ConnectionState::Disconnected {
                    *state = next;
                }
            })
            .map_err(|()| Error::Disconnected)
    }

    /// Current lifecycle state of the connection.
    pub fn state(&self) -> impl Future<Item = ConnectionState, Error = Error> {
        self.state
            .read()
            .map(|state| *state)
            .map_err(|()| Error::Disconnected)
    }

    /// Construct and register a channel. The registry keeps the channel
    /// alive until it is closed.
    pub fn new_channel(&self, source_id: &str, destination_id: &str, namespace: &str) -> Channel {
        self.registry
            .open(&self.link, source_id, destination_id, namespace)
    }

    pub fn close_channel(&self, channel: &Channel) {
        self.registry.remove(channel);
    }

    /// Number of registered channels, the built-in ones included.
    pub fn channel_count(&self) -> usize {
        self.registry.len()
    }

    /// Built-in channel on the connection namespace.
    pub fn connection(&self) -> &Channel {
        &self.connection
    }

    /// Built-in channel on the heartbeat namespace.
    pub fn heartbeat(&self) -> &Channel {
        &self.heartbeat
    }

    pub fn next_request_id(&self) -> i64 {
        self.link.next_request_id()
    }

    /// Write one envelope as a frame. Transport errors are returned as is.
    pub fn send(&self, envelope: &Envelope) -> impl Future<Item = (), Error = Error> {
        self.link.send(envelope)
    }

    /// Stop the dispatch loop and the heartbeat. Frames already queued are
    /// still written. The client ends up `Disconnected`.
    pub fn shutdown(&self) {
        if self.shutdown.terminate() {
            info!("shutting down cast client");
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Client")
            .field("channels", &self.registry.len())
            .field("connection", &self.connection)
            .field("heartbeat", &self.heartbeat)
            .finish()
    }
}

/// Asynchronously establish a TLS connection. The receiver's certificate is
/// self-signed, so neither the certificate nor the hostname is verified.
fn tls_connect(addr: SocketAddr) -> impl Future<Item = TlsStream<TcpStream>, Error = Error> {
    let connector = native_tls::TlsConnector::builder()
        .danger_accept_invalid_hostnames(true)
        .danger_accept_invalid_certs(true)
        .build()
        .map(TlsConnector::from);
    let connector = match connector {
        Ok(connector) => connector,
        Err(err) => return Either::A(future::err(Error::Tls(err))),
    };
    let connect = TcpStream::connect(&addr)
        .map_err(Error::Io)
        .and_then(move |socket| {
            info!("Establishing TLS connection to {:?}", addr);
            connector
                .connect(&addr.ip().to_string(), socket)
                .map_err(Error::Tls)
        });
    Either::B(connect)
}

/// Connect to the receiver at `addr` with the default configuration.
pub fn connect(addr: SocketAddr) -> impl Future<Item = Client, Error = Error> {
    connect_with(addr, Config::default())
}

pub fn connect_with(addr: SocketAddr, config: Config) -> impl Future<Item = Client, Error = Error> {
    tls_connect(addr).and_then(move |socket| {
        info!("TLS connection established");
        Client::from_stream(socket, config)
    })
}
