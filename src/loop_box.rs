use std::sync::Arc;

use derive_ex::derive_ex;
use log::debug;

use crate::{Result, StateStream, Subscription};


/// Operations shared by a loop and the scoped views derived from it.
///
/// Every view funnels its events into the queue of the same root loop and
/// observes the state of that loop through a projection.
pub trait LoopBox<S: 'static, E: 'static> {
    /// The name of the root loop, used in log records.
    fn name(&self) -> &str;

    /// Enqueue `event`, reporting why it was not accepted.
    fn try_send(&self, event: E) -> Result<()>;

    /// Enqueue `event`. Rejected events are logged and dropped.
    fn send(&self, event: E) {
        if let Err(e) = self.try_send(event) {
            debug!("loop `{}`: event rejected: {e}", self.name());
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&S) -> R) -> R;

    fn state(&self) -> S
    where
        S: Clone,
    {
        self.with_state(S::clone)
    }

    /// Call `f` with the current state, then with every later state.
    fn subscribe(&self, f: impl FnMut(&S) + Send + 'static) -> Subscription;

    fn states(&self) -> StateStream<S>
    where
        S: Clone + Send;

    /// Create a view of a part of the state that accepts its own event type.
    fn scoped<S2: 'static, E2: 'static>(
        &self,
        extract: impl Fn(&S) -> S2 + Send + Sync + 'static,
        embed: impl Fn(E2) -> E + Send + Sync + 'static,
    ) -> ScopedLoop<S2, E2>;

    fn pause(&self);
    fn resume(&self);
    fn is_paused(&self) -> bool;
    fn is_disposed(&self) -> bool;
}

pub(crate) trait LoopControl: Send + Sync {
    fn name(&self) -> &str;
    fn pause(&self);
    fn resume(&self);
    fn is_paused(&self) -> bool;
    fn is_disposed(&self) -> bool;
}

type ViewFn<S> = Arc<dyn Fn(&mut dyn FnMut(&S)) + Send + Sync>;
type SubscribeFn<S> = Arc<dyn Fn(Box<dyn FnMut(&S) + Send>) -> Subscription + Send + Sync>;
type SendFn<E> = Arc<dyn Fn(E) -> Result<()> + Send + Sync>;

/// A view of a part of a loop.
///
/// A scoped loop does not own the loop it was derived from: once the root
/// loop is dropped, sends fail with [`Error::Disposed`](crate::Error::Disposed)
/// and state feeds end. Scoping a scoped loop composes the projections, so
/// every view talks to the root directly.
#[derive_ex(Clone, bound())]
pub struct ScopedLoop<S: 'static, E: 'static> {
    view: ViewFn<S>,
    subscribe: SubscribeFn<S>,
    send: SendFn<E>,
    control: Arc<dyn LoopControl>,
}

impl<S: 'static, E: 'static> ScopedLoop<S, E> {
    pub(crate) fn new(
        view: impl Fn(&mut dyn FnMut(&S)) + Send + Sync + 'static,
        subscribe: impl Fn(Box<dyn FnMut(&S) + Send>) -> Subscription + Send + Sync + 'static,
        send: impl Fn(E) -> Result<()> + Send + Sync + 'static,
        control: Arc<dyn LoopControl>,
    ) -> Self {
        Self {
            view: Arc::new(view),
            subscribe: Arc::new(subscribe),
            send: Arc::new(send),
            control,
        }
    }
}

impl<S: 'static, E: 'static> LoopBox<S, E> for ScopedLoop<S, E> {
    fn name(&self) -> &str {
        self.control.name()
    }

    fn try_send(&self, event: E) -> Result<()> {
        (self.send)(event)
    }

    fn with_state<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        let mut f = Some(f);
        let mut result = None;
        (self.view)(&mut |s: &S| {
            if let Some(f) = f.take() {
                result = Some(f(s));
            }
        });
        match result {
            Some(result) => result,
            None => unreachable!("state view did not call back"),
        }
    }

    fn subscribe(&self, f: impl FnMut(&S) + Send + 'static) -> Subscription {
        (self.subscribe)(Box::new(f))
    }

    fn states(&self) -> StateStream<S>
    where
        S: Clone + Send,
    {
        let subscribe = self.subscribe.clone();
        StateStream::new(move |tx| {
            subscribe(Box::new(move |s: &S| {
                let _ = tx.unbounded_send(s.clone());
            }))
        })
    }

    fn scoped<S2: 'static, E2: 'static>(
        &self,
        extract: impl Fn(&S) -> S2 + Send + Sync + 'static,
        embed: impl Fn(E2) -> E + Send + Sync + 'static,
    ) -> ScopedLoop<S2, E2> {
        let extract = Arc::new(extract);
        let view = self.view.clone();
        let subscribe = self.subscribe.clone();
        let send = self.send.clone();
        ScopedLoop::new(
            {
                let extract = extract.clone();
                move |f: &mut dyn FnMut(&S2)| view(&mut |s: &S| f(&extract(s)))
            },
            move |mut f: Box<dyn FnMut(&S2) + Send>| {
                let extract = extract.clone();
                subscribe(Box::new(move |s: &S| f(&extract(s))))
            },
            move |e| send(embed(e)),
            self.control.clone(),
        )
    }

    fn pause(&self) {
        self.control.pause()
    }
    fn resume(&self) {
        self.control.resume()
    }
    fn is_paused(&self) -> bool {
        self.control.is_paused()
    }
    fn is_disposed(&self) -> bool {
        self.control.is_disposed()
    }
}
