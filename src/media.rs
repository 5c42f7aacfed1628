//! The media channel reports media sessions and playback. See the
//! [cast reference docs](https://developers.google.com/cast/docs/reference/messages).

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use cast_client::payload::{connection, RequestId};
use cast_client::{Channel, Client, Envelope, Error, WeakChannel, DEFAULT_SENDER_ID};
use futures::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::Future;
use serde_derive::{Deserialize, Serialize};

use crate::receiver::Volume;

pub const NAMESPACE: &str = "urn:x-cast:com.google.cast.media";

pub const MEDIA_STATUS: &str = "MEDIA_STATUS";

/// Timeout of the status request issued when the media endpoint accepts
/// the connection.
const CONNECTED_STATUS_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Serialize, Debug)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    #[serde(rename_all = "camelCase")]
    GetStatus {
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        media_session_id: Option<i64>,
    },
}

impl RequestId for Request {
    fn request_id(&self) -> Option<i64> {
        match *self {
            Request::GetStatus { request_id, .. } => request_id,
        }
    }

    fn set_request_id(&mut self, id: i64) {
        match self {
            Request::GetStatus { request_id, .. } => *request_id = Some(id),
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[serde(default)]
    pub request_id: i64,
    #[serde(default)]
    pub status: Vec<MediaStatus>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MediaStatus {
    pub media_session_id: i64,
    #[serde(default)]
    pub media: Option<MediaInformation>,
    #[serde(default)]
    pub playback_rate: f64,
    #[serde(default)]
    pub player_state: PlayerState,
    #[serde(default)]
    pub idle_reason: Option<IdleReason>,
    #[serde(default)]
    pub current_time: f64,
    #[serde(default)]
    pub supported_media_commands: u32,
    #[serde(default)]
    pub volume: Option<Volume>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MediaInformation {
    pub content_id: String,
    #[serde(default)]
    pub stream_type: StreamType,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub duration: Option<f64>,
}

#[derive(Deserialize, Debug, Eq, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamType {
    None,
    Buffered,
    Live,
    /// Missing, or a stream type this crate does not know.
    #[serde(other)]
    Unknown,
}

impl Default for StreamType {
    fn default() -> Self {
        StreamType::Unknown
    }
}

#[derive(Deserialize, Debug, Eq, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayerState {
    Idle,
    Playing,
    Buffering,
    Paused,
    /// Missing, or a state such as `LOADING` that this crate does not model.
    #[serde(other)]
    Unknown,
}

impl Default for PlayerState {
    fn default() -> Self {
        PlayerState::Unknown
    }
}

#[derive(Deserialize, Debug, Eq, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdleReason {
    Cancelled,
    Interrupted,
    Finished,
    Error,
    #[serde(other)]
    Unknown,
}

type StatusSink = Arc<Mutex<Option<UnboundedSender<Vec<MediaStatus>>>>>;

/// Tracks media sessions on an app transport.
///
/// The controller opens a virtual connection to the transport and a media
/// channel to it. `MEDIA_STATUS` messages are forwarded on the stream
/// returned by [`MediaController::new`]. When the transport sends `CLOSE`
/// both channels are closed and the stream ends.
#[derive(Debug)]
pub struct MediaController {
    channel: Channel,
    connection: Channel,
}

impl MediaController {
    pub fn new(
        client: &Client,
        source_id: &str,
        destination_id: &str,
    ) -> (Self, UnboundedReceiver<Vec<MediaStatus>>) {
        let channel = client.new_channel(source_id, destination_id, NAMESPACE);
        let connection =
            client.new_channel(DEFAULT_SENDER_ID, destination_id, connection::NAMESPACE);
        let (tx, rx) = mpsc::unbounded();
        let sink: StatusSink = Arc::new(Mutex::new(Some(tx)));

        let statuses = sink.clone();
        channel.on_message(MEDIA_STATUS, move |envelope| forward(&statuses, envelope));

        let media = channel.downgrade();
        connection.on_message(connection::CONNECT, move |envelope| {
            info!("Connected to {}", envelope.source_id());
            if let Some(channel) = media.upgrade() {
                let status = channel
                    .request(
                        Request::GetStatus {
                            request_id: None,
                            media_session_id: None,
                        },
                        CONNECTED_STATUS_TIMEOUT,
                    )
                    .map(|_| ());
                cast_client::detach(status, "media status");
            }
        });

        let media = channel.downgrade();
        let transport = connection.downgrade();
        connection.on_message(connection::CLOSE, move |envelope| {
            info!("Disconnected from {}", envelope.source_id());
            disconnect(&media, &transport, &sink);
        });

        cast_client::detach(connection.send(&connection::Request::Connect), "media connect");
        (
            Self {
                channel,
                connection,
            },
            rx,
        )
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn get_status(&self, timeout: Duration) -> impl Future<Item = Envelope, Error = Error> {
        self.channel.request(
            Request::GetStatus {
                request_id: None,
                media_session_id: None,
            },
            timeout,
        )
    }

    /// Close both channels. The status stream is not ended.
    pub fn close(&self) {
        self.channel.close();
        self.connection.close();
    }
}

fn forward(sink: &StatusSink, envelope: &Envelope) {
    let response = match envelope.parse::<StatusResponse>() {
        Ok(response) => response,
        Err(err) => {
            error!("Failed to decode media status: {}", err);
            return;
        }
    };
    let sink = sink.lock().unwrap_or_else(PoisonError::into_inner);
    match sink.as_ref() {
        Some(tx) if tx.unbounded_send(response.status).is_ok() => {}
        _ => warn!("Incoming media status, but nobody is listening"),
    }
}

fn disconnect(media: &WeakChannel, transport: &WeakChannel, sink: &StatusSink) {
    if let Some(channel) = media.upgrade() {
        channel.close();
    }
    if let Some(channel) = transport.upgrade() {
        channel.close();
    }
    // Dropping the sender ends the status stream.
    sink.lock().unwrap_or_else(PoisonError::into_inner).take();
}
