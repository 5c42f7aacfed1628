//! The receiver channel manages global receiver state like the active cast app
//! and device volume.

use std::time::Duration;

use cast_client::payload::RequestId;
use cast_client::{Channel, Client, Envelope, Error};
use futures::sync::mpsc::{self, UnboundedReceiver};
use futures::Future;
use serde_derive::{Deserialize, Serialize};

pub const NAMESPACE: &str = "urn:x-cast:com.google.cast.receiver";

pub const RECEIVER_STATUS: &str = "RECEIVER_STATUS";

#[derive(Serialize, Debug)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    #[serde(rename_all = "camelCase")]
    GetStatus {
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<i64>,
    },
    #[serde(rename_all = "camelCase")]
    SetVolume {
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<i64>,
        volume: Volume,
    },
}

impl RequestId for Request {
    fn request_id(&self) -> Option<i64> {
        match *self {
            Request::GetStatus { request_id } | Request::SetVolume { request_id, .. } => request_id,
        }
    }

    fn set_request_id(&mut self, id: i64) {
        match self {
            Request::GetStatus { request_id } | Request::SetVolume { request_id, .. } => {
                *request_id = Some(id);
            }
        }
    }
}

/// Body of a `RECEIVER_STATUS` message, either a reply or a spontaneous
/// update.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[serde(default)]
    pub request_id: i64,
    pub status: Status,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    #[serde(default)]
    pub applications: Vec<Application>,
    #[serde(default)]
    pub is_active_input: bool,
    #[serde(default)]
    pub is_stand_by: bool,
    #[serde(default)]
    pub volume: Volume,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub app_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub namespaces: Vec<Namespace>,
    pub session_id: String,
    #[serde(default)]
    pub status_text: String,
    pub transport_id: String,
}

#[derive(Deserialize, Debug)]
pub struct Namespace {
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq)]
pub struct Volume {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
}

/// Tracks receiver status on the platform receiver.
///
/// Every `RECEIVER_STATUS` the receiver sends on this controller's channel,
/// replies included, is parsed and forwarded on the stream returned by
/// [`ReceiverController::new`].
#[derive(Debug)]
pub struct ReceiverController {
    channel: Channel,
}

impl ReceiverController {
    pub fn new(
        client: &Client,
        source_id: &str,
        destination_id: &str,
    ) -> (Self, UnboundedReceiver<Status>) {
        let channel = client.new_channel(source_id, destination_id, NAMESPACE);
        let (tx, rx) = mpsc::unbounded();
        channel.on_message(RECEIVER_STATUS, move |envelope| {
            let response = match envelope.parse::<StatusResponse>() {
                Ok(response) => response,
                Err(err) => {
                    error!("Failed to decode receiver status: {}", err);
                    return;
                }
            };
            if tx.unbounded_send(response.status).is_err() {
                warn!("Incoming receiver status, but nobody is listening");
            }
        });
        (Self { channel }, rx)
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn get_status(&self, timeout: Duration) -> impl Future<Item = Envelope, Error = Error> {
        self.channel
            .request(Request::GetStatus { request_id: None }, timeout)
    }

    pub fn get_volume(&self, timeout: Duration) -> impl Future<Item = Volume, Error = Error> {
        self.get_status(timeout)
            .and_then(|reply| reply.parse::<StatusResponse>())
            .map(|response| response.status.volume)
    }

    /// Set the device volume. Unset fields of `volume` are left unchanged.
    pub fn set_volume(
        &self,
        volume: Volume,
        timeout: Duration,
    ) -> impl Future<Item = Envelope, Error = Error> {
        self.channel.request(
            Request::SetVolume {
                request_id: None,
                volume,
            },
            timeout,
        )
    }
}
