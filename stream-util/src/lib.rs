// stream-util is based on stream-cancel@0.4.4
// <https://github.com/jonhoo/stream-cancel>
//
// MIT License
//
// Copyright (c) 2016 Jon Gjengset

//! Cooperative shutdown for long-lived streams.
//!
//! A [`Trigger`] and its [`Valve`] are created as a pair. The valve is cheap
//! to clone, so a single trigger can tear down every task that was handed a
//! copy: [`Cancelable::cancel`] short-circuits a stream, [`Drainable::drain`]
//! closes a channel receiver and yields whatever was already queued.

use futures::future::Shared;
use futures::prelude::*;
use futures::sync::mpsc::UnboundedReceiver;
use futures::sync::oneshot;

#[derive(Debug)]
pub struct Trigger(oneshot::Sender<()>);

impl Trigger {
    /// Resolve every `Valve` cloned from this trigger's pair.
    pub fn terminate(self) {
        let _ = self.0.send(());
    }
}

/// Dropping a `Trigger` without calling `terminate` leaves its valves
/// permanently closed-off: they never resolve successfully.
pub type Valve = UnitFuture<Shared<oneshot::Receiver<()>>>;

pub fn valve() -> (Trigger, Valve) {
    let (trigger, valve) = oneshot::channel();
    (Trigger(trigger), UnitFuture(valve.shared()))
}

/// Allow `Future`s of arbitrary types to serve as `Valve`s. Useful when, e.g.
/// making a `oneshot::Receiver` a `shared` `Future`.
#[derive(Clone, Debug)]
pub struct UnitFuture<F>(F);

impl<F> Future for UnitFuture<F>
where
    F: Future,
{
    type Item = ();
    type Error = ();

    fn poll(&mut self) -> Result<Async<Self::Item>, Self::Error> {
        match self.0.poll() {
            Ok(Async::Ready(_)) => Ok(Async::Ready(())),
            Ok(Async::NotReady) => Ok(Async::NotReady),
            Err(_) => Err(()),
        }
    }
}

#[derive(Debug, Eq, PartialEq)]
enum DrainState {
    Active,
    Draining,
}

#[derive(Debug)]
pub struct Drain<S, F> {
    receiver: S,
    until: F,
    state: DrainState,
}

impl<S, F> Stream for Drain<UnboundedReceiver<S>, F>
where
    F: Future<Item = (), Error = ()>,
{
    type Item = S;
    type Error = ();

    fn poll(&mut self) -> Poll<Option<Self::Item>, Self::Error> {
        if self.state == DrainState::Active {
            if let Ok(Async::Ready(_)) = self.until.poll() {
                // Close the receiver so senders fail fast; already queued
                // items are still yielded before the stream terminates.
                self.receiver.close();
                self.state = DrainState::Draining;
            }
        }
        self.receiver.poll()
    }
}

pub trait Drainable: Stream {
    fn drain<F>(self, trigger: F) -> Drain<Self, UnitFuture<F::Future>>
    where
        F: IntoFuture,
        Self: Sized,
    {
        Drain {
            receiver: self,
            until: UnitFuture(trigger.into_future()),
            state: DrainState::Active,
        }
    }
}

impl<S> Drainable for S where S: Stream {}

#[derive(Debug)]
pub struct Cancel<S, F> {
    stream: S,
    until: F,
}

impl<S, F> Stream for Cancel<S, F>
where
    S: Stream,
    F: Future<Item = (), Error = ()>,
{
    type Item = S::Item;
    type Error = S::Error;

    fn poll(&mut self) -> Poll<Option<Self::Item>, Self::Error> {
        if let Ok(Async::Ready(_)) = self.until.poll() {
            return Ok(Async::Ready(None));
        }
        self.stream.poll()
    }
}

pub trait Cancelable: Stream {
    fn cancel<F>(self, trigger: F) -> Cancel<Self, UnitFuture<F::Future>>
    where
        F: IntoFuture,
        Self: Sized,
    {
        Cancel {
            stream: self,
            until: UnitFuture(trigger.into_future()),
        }
    }
}

impl<S> Cancelable for S where S: Stream {}
