use std::{
    any::Any,
    fmt,
    pin::Pin,
    task::{Context, Poll},
};

use futures::{
    channel::mpsc::{self, UnboundedReceiver, UnboundedSender},
    stream::FusedStream,
    Stream, StreamExt,
};

use crate::Subscription;


type Start<T> = Box<dyn FnOnce(UnboundedSender<T>) -> Subscription + Send>;

/// A [`Stream`] of the states of a loop.
///
/// Nothing is subscribed until the stream is first polled. The first item is
/// the state current at that moment; the stream ends when the loop is disposed.
#[must_use = "streams do nothing unless polled"]
pub struct StateStream<T> {
    start: Option<Start<T>>,
    rx: Option<UnboundedReceiver<T>>,
    subscription: Option<Subscription>,
    owner: Option<Box<dyn Any + Send>>,
}

impl<T: 'static> StateStream<T> {
    pub(crate) fn new(start: impl FnOnce(UnboundedSender<T>) -> Subscription + Send + 'static) -> Self {
        Self {
            start: Some(Box::new(start)),
            rx: None,
            subscription: None,
            owner: None,
        }
    }

    /// Keep `owner` alive for as long as the stream.
    pub(crate) fn with_owner(mut self, owner: impl Any + Send) -> Self {
        self.owner = Some(Box::new(owner));
        self
    }

    fn receiver(&mut self) -> Option<&mut UnboundedReceiver<T>> {
        if let Some(start) = self.start.take() {
            let (tx, rx) = mpsc::unbounded();
            self.rx = Some(rx);
            self.subscription = Some(start(tx));
        }
        self.rx.as_mut()
    }
}

impl<T: 'static> Stream for StateStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = self.get_mut();
        let Some(rx) = this.receiver() else {
            return Poll::Ready(None);
        };
        let item = rx.poll_next_unpin(cx);
        if let Poll::Ready(None) = item {
            this.rx = None;
            this.subscription = None;
            this.owner = None;
        }
        item
    }
}

impl<T: 'static> FusedStream for StateStream<T> {
    fn is_terminated(&self) -> bool {
        self.start.is_none() && self.rx.is_none()
    }
}

impl<T> fmt::Debug for StateStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStream")
            .field("is_started", &self.start.is_none())
            .field("is_terminated", &(self.start.is_none() && self.rx.is_none()))
            .finish()
    }
}
