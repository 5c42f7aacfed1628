use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use futures::sync::mpsc::{self, UnboundedReceiver};
use futures::{Future, Stream};
use tokio::runtime::Runtime;

use super::*;
use crate::envelope::{self, Envelope, Payload};
use crate::link::Link;
use crate::payload::{self, Header, RequestId};
use crate::worker::Write;
use crate::Config;

const NAMESPACE: &str = "urn:x-cast:com.google.cast.receiver";
const MEDIA_NAMESPACE: &str = "urn:x-cast:com.google.cast.media";

fn harness() -> (Arc<Registry>, Link, UnboundedReceiver<Write>) {
    let _ = env_logger::try_init();
    let registry = Arc::new(Registry::default());
    let (writer, writes) = mpsc::unbounded();
    let link = Link::new(writer, &registry);
    (registry, link, writes)
}

/// Acknowledge every queued frame as written and hand its envelope to the
/// test thread.
fn loopback(rt: &mut Runtime, writes: UnboundedReceiver<Write>) -> std_mpsc::Receiver<Envelope> {
    let (tx, rx) = std_mpsc::channel();
    rt.spawn(writes.for_each(move |Write { frame, ack }| {
        let _ = ack.send(Ok(()));
        if let Ok(envelope) = envelope::decode(&frame) {
            let _ = tx.send(envelope);
        }
        Ok(())
    }));
    rx
}

fn frame(source: &str, destination: &str, namespace: &str, payload: &str) -> Vec<u8> {
    let envelope = Envelope::new(
        source,
        destination,
        namespace,
        Payload::Utf8(payload.to_owned()),
    );
    envelope::encode(&envelope).unwrap().to_vec()
}

fn counter(channel: &Channel, kind: &str) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let seen = count.clone();
    channel.on_message(kind, move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    count
}

#[test]
fn delivers_only_role_swapped_triple() {
    let (registry, link, _writes) = harness();
    let channel = registry.open(&link, "sender-0", "receiver-0", NAMESPACE);
    let status = counter(&channel, "RECEIVER_STATUS");
    let payload = r#"{"type":"RECEIVER_STATUS"}"#;

    assert!(registry.dispatch(&frame("receiver-0", "sender-0", NAMESPACE, payload)));
    assert!(!registry.dispatch(&frame("sender-0", "receiver-0", NAMESPACE, payload)));
    assert!(!registry.dispatch(&frame("receiver-0", "sender-0", MEDIA_NAMESPACE, payload)));
    assert!(!registry.dispatch(&frame("web-5", "sender-0", NAMESPACE, payload)));
    assert_eq!(status.load(Ordering::SeqCst), 1);
}

#[test]
fn broadcast_reaches_every_channel() {
    let (registry, link, _writes) = harness();
    let receiver = registry.open(&link, "sender-0", "receiver-0", NAMESPACE);
    let media = registry.open(&link, "sender-1", "web-5", MEDIA_NAMESPACE);
    let first = counter(&receiver, "MEDIA_STATUS");
    let second = counter(&media, "MEDIA_STATUS");

    let payload = r#"{"type":"MEDIA_STATUS","requestId":12}"#;
    assert!(registry.dispatch(&frame("web-5", "*", MEDIA_NAMESPACE, payload)));
    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 1);
}

#[test]
fn broadcast_never_completes_a_request() {
    let (registry, link, _writes) = harness();
    let channel = registry.open(&link, "sender-0", "receiver-0", NAMESPACE);
    let status = counter(&channel, "RECEIVER_STATUS");

    let request = channel.request(Header::new("GET_STATUS"), Duration::from_secs(5));
    assert_eq!(channel.in_flight(), 1);
    let payload = r#"{"type":"RECEIVER_STATUS","requestId":1}"#;
    assert!(registry.dispatch(&frame("receiver-0", "*", NAMESPACE, payload)));
    assert_eq!(status.load(Ordering::SeqCst), 1);
    assert_eq!(channel.in_flight(), 1);

    // The pending request still resolves with its own reply.
    assert!(registry.dispatch(&frame("receiver-0", "sender-0", NAMESPACE, payload)));
    assert_eq!(channel.in_flight(), 0);
    drop(request);
}

#[test]
fn listeners_run_in_registration_order() {
    let (registry, link, _writes) = harness();
    let channel = registry.open(&link, "sender-0", "receiver-0", NAMESPACE);
    let calls = Arc::new(Mutex::new(Vec::new()));
    for (kind, tag) in &[("RECEIVER_STATUS", 1), ("LAUNCH_ERROR", 2), ("RECEIVER_STATUS", 3)] {
        let calls = calls.clone();
        let tag = *tag;
        channel.on_message(kind, move |_| calls.lock().unwrap().push(tag));
    }

    assert!(registry.dispatch(&frame(
        "receiver-0",
        "sender-0",
        NAMESPACE,
        r#"{"type":"RECEIVER_STATUS"}"#
    )));
    assert_eq!(*calls.lock().unwrap(), vec![1, 3]);
}

#[test]
fn unknown_request_id_is_not_delivered() {
    let (registry, link, _writes) = harness();
    let channel = registry.open(&link, "sender-0", "receiver-0", NAMESPACE);
    let status = counter(&channel, "RECEIVER_STATUS");

    let payload = r#"{"type":"RECEIVER_STATUS","requestId":99}"#;
    assert!(!registry.dispatch(&frame("receiver-0", "sender-0", NAMESPACE, payload)));
    assert_eq!(status.load(Ordering::SeqCst), 0);
}

#[test]
fn spontaneous_message_reaches_listeners() {
    let (registry, link, _writes) = harness();
    let channel = registry.open(&link, "sender-0", "receiver-0", NAMESPACE);
    let status = counter(&channel, "RECEIVER_STATUS");

    let payload = r#"{"type":"RECEIVER_STATUS","requestId":0}"#;
    assert!(registry.dispatch(&frame("receiver-0", "sender-0", NAMESPACE, payload)));
    assert_eq!(status.load(Ordering::SeqCst), 1);
}

#[test]
fn undeliverable_frames_are_dropped() {
    let (registry, link, _writes) = harness();
    let channel = registry.open(&link, "sender-0", "receiver-0", NAMESPACE);
    let status = counter(&channel, "RECEIVER_STATUS");

    assert!(!registry.dispatch(b"not a cast message"));
    assert!(!registry.dispatch(&frame("receiver-0", "sender-0", NAMESPACE, "not json")));
    assert!(!registry.dispatch(&frame("receiver-0", "sender-0", NAMESPACE, r#"{"level":1}"#)));
    let binary = Envelope::new("receiver-0", "sender-0", NAMESPACE, Payload::Binary(vec![7]));
    assert!(!registry.dispatch(&envelope::encode(&binary).unwrap()));
    assert!(!registry.dispatch(&frame(
        "receiver-0",
        "sender-0",
        NAMESPACE,
        r#"{"type":"NOBODY_LISTENS"}"#
    )));

    // A malformed frame does not disturb later ones.
    assert!(registry.dispatch(&frame(
        "receiver-0",
        "sender-0",
        NAMESPACE,
        r#"{"type":"RECEIVER_STATUS"}"#
    )));
    assert_eq!(status.load(Ordering::SeqCst), 1);
}

#[test]
fn closed_channel_is_unroutable() {
    let (registry, link, _writes) = harness();
    let channel = registry.open(&link, "sender-0", "receiver-0", NAMESPACE);
    let status = counter(&channel, "RECEIVER_STATUS");
    let payload = r#"{"type":"RECEIVER_STATUS"}"#;

    assert!(registry.dispatch(&frame("receiver-0", "sender-0", NAMESPACE, payload)));
    channel.close();
    assert_eq!(registry.len(), 0);
    assert!(!registry.dispatch(&frame("receiver-0", "sender-0", NAMESPACE, payload)));
    assert_eq!(status.load(Ordering::SeqCst), 1);

    // Closing again is a no-op.
    channel.close();
    assert_eq!(registry.len(), 0);
}

#[test]
fn channels_sharing_a_triple_close_independently() {
    let (registry, link, _writes) = harness();
    let first = registry.open(&link, "sender-0", "receiver-0", NAMESPACE);
    let second = registry.open(&link, "sender-0", "receiver-0", NAMESPACE);
    assert_ne!(first, second);
    let first_count = counter(&first, "RECEIVER_STATUS");
    let second_count = counter(&second, "RECEIVER_STATUS");

    second.close();
    let payload = r#"{"type":"RECEIVER_STATUS"}"#;
    assert!(registry.dispatch(&frame("receiver-0", "sender-0", NAMESPACE, payload)));
    assert_eq!(first_count.load(Ordering::SeqCst), 1);
    assert_eq!(second_count.load(Ordering::SeqCst), 0);
}

#[test]
fn listener_may_open_channels_during_dispatch() {
    let (registry, link, _writes) = harness();
    let channel = registry.open(&link, "sender-0", "receiver-0", NAMESPACE);
    let opener = Arc::downgrade(&registry);
    let listener_link = link.clone();
    channel.on_message("RECEIVER_STATUS", move |envelope| {
        if let Some(registry) = opener.upgrade() {
            registry.open(&listener_link, "sender-0", "web-5", MEDIA_NAMESPACE);
            assert_eq!(envelope.source_id(), "receiver-0");
        }
    });

    let payload = r#"{"type":"RECEIVER_STATUS"}"#;
    assert!(registry.dispatch(&frame("receiver-0", "sender-0", NAMESPACE, payload)));
    assert_eq!(registry.len(), 2);
}

#[test]
fn request_resolves_with_correlated_reply() {
    let (registry, link, writes) = harness();
    let mut rt = Runtime::new().unwrap();
    let sent = loopback(&mut rt, writes);
    let channel = registry.open(&link, "sender-0", "receiver-0", NAMESPACE);
    let status = counter(&channel, "RECEIVER_STATUS");

    let request = channel.request(Header::new("GET_STATUS"), Duration::from_secs(5));
    let peer = registry.clone();
    let receiver = thread::spawn(move || {
        let request = sent.recv().unwrap();
        let header = request.header().unwrap();
        assert_eq!(header.kind(), Some("GET_STATUS"));
        let request_id = header.request_id().unwrap();
        let reply = format!(
            r#"{{"type":"RECEIVER_STATUS","requestId":{},"status":{{}}}}"#,
            request_id
        );
        assert!(peer.dispatch(&frame("receiver-0", "sender-0", NAMESPACE, &reply)));
        request_id
    });

    let reply = rt.block_on(request).unwrap();
    let request_id = receiver.join().unwrap();
    assert_eq!(reply.header().unwrap().correlation_id(), Some(request_id));
    assert_eq!(channel.in_flight(), 0);

    // A later push without a request id only reaches listeners.
    let push = r#"{"type":"RECEIVER_STATUS","status":{}}"#;
    assert!(registry.dispatch(&frame("receiver-0", "sender-0", NAMESPACE, push)));
    assert_eq!(status.load(Ordering::SeqCst), 2);
}

#[test]
fn request_times_out_and_late_reply_is_stale() {
    let (registry, link, writes) = harness();
    let mut rt = Runtime::new().unwrap();
    let sent = loopback(&mut rt, writes);
    let channel = registry.open(&link, "sender-0", "receiver-0", NAMESPACE);
    let status = counter(&channel, "RECEIVER_STATUS");

    let request = channel.request(Header::new("GET_STATUS"), Duration::from_millis(50));
    match rt.block_on(request) {
        Err(Error::RequestTimeout {
            request_id,
            destination,
            ..
        }) => {
            assert_eq!(request_id, 1);
            assert_eq!(destination, "receiver-0");
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    assert_eq!(channel.in_flight(), 0);
    assert!(sent.recv().is_ok());

    let late = r#"{"type":"RECEIVER_STATUS","requestId":1}"#;
    assert!(!registry.dispatch(&frame("receiver-0", "sender-0", NAMESPACE, late)));
    assert_eq!(status.load(Ordering::SeqCst), 0);
}

#[test]
fn timeout_leaves_other_requests_alone() {
    let (registry, link, writes) = harness();
    let mut rt = Runtime::new().unwrap();
    let sent = loopback(&mut rt, writes);
    let channel = registry.open(&link, "sender-0", "receiver-0", NAMESPACE);

    let short = channel.request(Header::new("GET_STATUS"), Duration::from_millis(20));
    let long = channel.request(Header::new("GET_STATUS"), Duration::from_secs(5));
    assert_eq!(channel.in_flight(), 2);
    assert!(rt.block_on(short).unwrap_err().is_timeout());
    assert_eq!(channel.in_flight(), 1);

    let _ = sent.recv().unwrap();
    let second = sent.recv().unwrap();
    let request_id = second.header().unwrap().request_id().unwrap();
    assert_eq!(request_id, 2);
    let reply = format!(r#"{{"type":"RECEIVER_STATUS","requestId":{}}}"#, request_id);
    assert!(registry.dispatch(&frame("receiver-0", "sender-0", NAMESPACE, &reply)));
    assert!(rt.block_on(long).is_ok());
    assert_eq!(channel.in_flight(), 0);
}

#[test]
fn failed_send_releases_reply_slot() {
    let (registry, link, writes) = harness();
    drop(writes);
    let channel = registry.open(&link, "sender-0", "receiver-0", NAMESPACE);

    match channel
        .request(Header::new("GET_STATUS"), Duration::from_secs(1))
        .wait()
    {
        Err(Error::Disconnected) => {}
        other => panic!("expected disconnected, got {:?}", other),
    }
    assert_eq!(channel.in_flight(), 0);
}

#[test]
fn dropped_request_releases_reply_slot() {
    let (registry, link, _writes) = harness();
    let channel = registry.open(&link, "sender-0", "receiver-0", NAMESPACE);

    let request = channel.request(Header::new("GET_STATUS"), Duration::from_secs(1));
    assert_eq!(channel.in_flight(), 1);
    drop(request);
    assert_eq!(channel.in_flight(), 0);
}

#[test]
fn send_stamps_channel_triple() {
    let (registry, link, writes) = harness();
    let channel = registry.open(&link, "sender-0", "web-5", MEDIA_NAMESPACE);
    drop(channel.send(&Header::new("PLAY")));
    drop(channel);
    drop(registry);
    drop(link);

    let frames = writes.collect().wait().unwrap();
    assert_eq!(frames.len(), 1);
    let sent = envelope::decode(&frames[0].frame).unwrap();
    assert_eq!(sent.source_id(), "sender-0");
    assert_eq!(sent.destination_id(), "web-5");
    assert_eq!(sent.namespace(), MEDIA_NAMESPACE);
    assert_eq!(sent.payload_utf8(), Some(r#"{"type":"PLAY"}"#));
}

#[test]
fn connection_channel_sends_connect() {
    let (registry, link, writes) = harness();
    let channel = connection::open(&registry, &link, &Config::default());
    assert_eq!(channel.namespace(), payload::connection::NAMESPACE);
    drop(channel);
    drop(registry);
    drop(link);

    let frames = writes.collect().wait().unwrap();
    assert_eq!(frames.len(), 1);
    let connect = envelope::decode(&frames[0].frame).unwrap();
    assert_eq!(connect.source_id(), "sender-0");
    assert_eq!(connect.destination_id(), "receiver-0");
    assert_eq!(connect.header().unwrap().kind(), Some(payload::connection::CONNECT));
}

#[test]
fn heartbeat_answers_each_ping_with_one_pong() {
    let (registry, link, writes) = harness();
    let channel = heartbeat::open(&registry, &link, &Config::default());

    let ping = r#"{"type":"PING"}"#;
    let pong = r#"{"type":"PONG"}"#;
    assert!(registry.dispatch(&frame("receiver-0", "sender-0", payload::heartbeat::NAMESPACE, ping)));
    assert!(registry.dispatch(&frame("receiver-0", "sender-0", payload::heartbeat::NAMESPACE, pong)));
    drop(channel);
    drop(registry);
    drop(link);

    let frames = writes.collect().wait().unwrap();
    assert_eq!(frames.len(), 1);
    let reply = envelope::decode(&frames[0].frame).unwrap();
    assert_eq!(reply.namespace(), payload::heartbeat::NAMESPACE);
    assert_eq!(reply.destination_id(), "receiver-0");
    assert_eq!(reply.payload_utf8(), Some(pong));
}
