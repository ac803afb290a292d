use std::{
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll},
};

use derive_ex::derive_ex;
use futures::{channel::mpsc, stream, Stream, StreamExt};
use slabmap::SlabMap;

use crate::{floodgate::lock, Consumer, States, Subscription};


/// A description of an effect driven by the state of a loop.
///
/// A feedback observes the state feed of a loop and enqueues the events its
/// effects produce. It holds no state of its own: everything a running
/// feedback remembers (the last projected value, the running effect) lives in
/// the subscription created by [`run`](Self::run), so a loop can detach and
/// reattach the same feedback.
///
/// Effects are [`Stream`]s of events. They have no error channel; a fallible
/// effect reports failures as events.
#[derive_ex(Clone, bound())]
pub struct Feedback<S: 'static, E: 'static>(
    Arc<dyn Fn(States<S, E>, Consumer<E>) -> Subscription + Send + Sync>,
);

enum Switch<U> {
    To(U),
    Off,
    Stay,
}

impl<S: 'static, E: 'static> Feedback<S, E> {
    /// Create a feedback with full control over the data flow.
    ///
    /// Events have to be enqueued explicitly through the consumer, usually with
    /// [`Consumer::enqueue`], which removes the unprocessed events of an effect
    /// when the effect is cancelled.
    pub fn custom(
        f: impl Fn(States<S, E>, Consumer<E>) -> Subscription + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(f))
    }

    /// Start the feedback against a state feed.
    pub fn run(&self, states: States<S, E>, consumer: Consumer<E>) -> Subscription {
        (self.0)(states, consumer)
    }

    /// Run all `feedbacks` against the same state feed.
    pub fn combine(feedbacks: impl IntoIterator<Item = Self>) -> Self {
        let feedbacks: Vec<_> = feedbacks.into_iter().collect();
        Self::custom(move |states, consumer| {
            feedbacks
                .iter()
                .map(|f| f.run(states.clone(), consumer.clone()))
                .collect()
        })
    }

    /// Lift this feedback into one over a larger state and event type.
    ///
    /// The state is projected through `value`. Causing events are passed on
    /// only when `extract_event` recognizes them, and the events produced by
    /// this feedback are embedded with `embed_event`.
    pub fn pullback<G: 'static, GE: 'static>(
        &self,
        value: impl Fn(&G) -> S + Send + Sync + 'static,
        embed_event: impl Fn(E) -> GE + Send + Sync + 'static,
        extract_event: impl Fn(&GE) -> Option<E> + Send + Sync + 'static,
    ) -> Feedback<G, GE> {
        let this = self.clone();
        let value = Arc::new(value);
        let embed_event = Arc::new(embed_event);
        let extract_event = Arc::new(extract_event);
        Feedback::custom(move |states: States<G, GE>, consumer: Consumer<GE>| {
            let value = value.clone();
            let extract_event = extract_event.clone();
            let embed_event = embed_event.clone();
            this.run(
                states.map(move |g| value(g), move |ge| extract_event(ge)),
                consumer.pullback(move |e| embed_event(e)),
            )
        })
    }
}

impl<S: Send + 'static, E: Send + 'static> Feedback<S, E> {
    /// Restart the effect each time `step` switches to a new value, cancelling
    /// the previous one first. `make_step` is called once per run.
    fn switching<U, Step, Fx>(
        make_step: impl Fn() -> Step + Send + Sync + 'static,
        effects: impl Fn(U) -> Fx + Send + Sync + 'static,
    ) -> Self
    where
        Step: FnMut(&S, Option<&E>) -> Switch<U> + Send + 'static,
        Fx: Stream<Item = E> + Send + 'static,
    {
        let effects = Arc::new(effects);
        Self::custom(move |states, consumer| {
            let mut step = make_step();
            let effects = effects.clone();
            let mut running: Option<Subscription> = None;
            states.observe(move |state, event| match step(state, event) {
                Switch::To(value) => {
                    drop(running.take());
                    running = Some(consumer.enqueue(effects(value)));
                }
                Switch::Off => drop(running.take()),
                Switch::Stay => {}
            })
        })
    }

    /// Bridge an external stream into events.
    ///
    /// `make` is called each time the feedback is attached. Events of the
    /// stream are never removed from the queue, and the stream is not
    /// restarted when the state changes.
    pub fn source<St>(
        make: impl Fn() -> St + Send + Sync + 'static,
        transform: impl Fn(St::Item) -> E + Send + Sync + 'static,
    ) -> Self
    where
        St: Stream + Send + 'static,
    {
        let transform = Arc::new(transform);
        Self::custom(move |_, consumer| {
            let transform = transform.clone();
            consumer.enqueue_non_cancelling(make().map(move |x| transform(x)))
        })
    }

    /// Create a feedback fed by an [`Input`] handle.
    ///
    /// Every event sent to the handle is enqueued by every attached instance
    /// of the feedback. Events sent while no instance is attached are lost.
    pub fn input() -> (Self, Input<E>)
    where
        E: Clone,
    {
        let input = Input {
            senders: Arc::new(Mutex::new(SlabMap::new())),
        };
        let senders = input.senders.clone();
        let feedback = Self::source(
            move || {
                let (tx, rx) = mpsc::unbounded();
                let key = lock(&senders).insert(tx);
                let registration =
                    Subscription::from_weak_fn(Arc::downgrade(&senders), move |senders| {
                        lock(&senders).remove(key);
                    });
                InputReceiver {
                    rx,
                    _registration: registration,
                }
            },
            |e| e,
        );
        (feedback, input)
    }
}

impl<S: Clone + Send + 'static, E: Send + 'static> Feedback<S, E> {
    /// Restart the effect on every state.
    pub fn effects<Fx>(effects: impl Fn(S) -> Fx + Send + Sync + 'static) -> Self
    where
        Fx: Stream<Item = E> + Send + 'static,
    {
        Self::switching(|| |s: &S, _: Option<&E>| Switch::To(s.clone()), effects)
    }

    /// Restart the effect whenever `transform` yields a value different from
    /// the previous one. A `None` cancels the running effect.
    pub fn skipping_repeated<C, Fx>(
        transform: impl Fn(&S) -> Option<C> + Send + Sync + 'static,
        effects: impl Fn(C) -> Fx + Send + Sync + 'static,
    ) -> Self
    where
        C: PartialEq + Clone + Send + 'static,
        Fx: Stream<Item = E> + Send + 'static,
    {
        let transform = Arc::new(transform);
        Self::switching(
            move || {
                let transform = transform.clone();
                let mut last: Option<Option<C>> = None;
                move |s: &S, _: Option<&E>| {
                    let value = transform(s);
                    if last.as_ref() == Some(&value) {
                        return Switch::Stay;
                    }
                    last = Some(value.clone());
                    match value {
                        Some(value) => Switch::To(value),
                        None => Switch::Off,
                    }
                }
            },
            effects,
        )
    }

    /// Restart the effect on every state for which `transform` yields a value.
    /// A `None` cancels the running effect.
    pub fn lensing<C, Fx>(
        transform: impl Fn(&S) -> Option<C> + Send + Sync + 'static,
        effects: impl Fn(C) -> Fx + Send + Sync + 'static,
    ) -> Self
    where
        C: Send + 'static,
        Fx: Stream<Item = E> + Send + 'static,
    {
        let transform = Arc::new(transform);
        Self::switching(
            move || {
                let transform = transform.clone();
                move |s: &S, _: Option<&E>| match transform(s) {
                    Some(value) => Switch::To(value),
                    None => Switch::Off,
                }
            },
            effects,
        )
    }

    /// Restart the effect on every state that passes `test`. A state that
    /// fails it cancels the running effect.
    pub fn predicate<Fx>(
        test: impl Fn(&S) -> bool + Send + Sync + 'static,
        effects: impl Fn(S) -> Fx + Send + Sync + 'static,
    ) -> Self
    where
        Fx: Stream<Item = E> + Send + 'static,
    {
        Self::lensing(move |s| test(s).then(|| s.clone()), effects)
    }

    /// Start the effect when `transform` yields a value after yielding `None`
    /// (or on the first state, if it already yields a value), and ignore the
    /// values that follow. Cancel the effect when `transform` yields `None` again.
    pub fn first_value_after_nil<V, Fx>(
        transform: impl Fn(&S) -> Option<V> + Send + Sync + 'static,
        effects: impl Fn(V) -> Fx + Send + Sync + 'static,
    ) -> Self
    where
        V: Send + 'static,
        Fx: Stream<Item = E> + Send + 'static,
    {
        let transform = Arc::new(transform);
        Self::switching(
            move || {
                let transform = transform.clone();
                let mut last_was_nil = true;
                move |s: &S, _: Option<&E>| match (last_was_nil, transform(s)) {
                    (true, Some(value)) => {
                        last_was_nil = false;
                        Switch::To(value)
                    }
                    (false, None) => {
                        last_was_nil = true;
                        Switch::Off
                    }
                    (true, None) | (false, Some(_)) => Switch::Stay,
                }
            },
            effects,
        )
    }

    /// Start the effect when `predicate` becomes true, and cancel it when the
    /// predicate becomes false. The first state counts as a transition.
    pub fn when_becomes_true<Fx>(
        predicate: impl Fn(&S) -> bool + Send + Sync + 'static,
        effects: impl Fn(S) -> Fx + Send + Sync + 'static,
    ) -> Self
    where
        Fx: Stream<Item = E> + Send + 'static,
    {
        Self::first_value_after_nil(move |s| predicate(s).then(|| s.clone()), effects)
    }
}

impl<S: Clone + Send + 'static, E: Clone + Send + 'static> Feedback<S, E> {
    /// Restart the effect for every state change, with the event that caused it.
    ///
    /// The replayed state a feedback starts with has no causing event and is
    /// skipped.
    pub fn middleware<Fx>(effect: impl Fn(S, E) -> Fx + Send + Sync + 'static) -> Self
    where
        Fx: Stream<Item = E> + Send + 'static,
    {
        Self::switching(
            || {
                |s: &S, e: Option<&E>| match e {
                    Some(e) => Switch::To((s.clone(), e.clone())),
                    None => Switch::Stay,
                }
            },
            move |(s, e)| effect(s, e),
        )
    }
}

impl<S: Send + 'static, E: Send + 'static> Feedback<S, E> {
    /// Restart the effect for every event carrying a payload. Other events
    /// cancel the running effect.
    pub fn extracting<P, Fx>(
        payload: impl Fn(&E) -> Option<P> + Send + Sync + 'static,
        effects: impl Fn(P) -> Fx + Send + Sync + 'static,
    ) -> Self
    where
        P: Send + 'static,
        Fx: Stream<Item = E> + Send + 'static,
    {
        let payload = Arc::new(payload);
        Self::switching(
            move || {
                let payload = payload.clone();
                move |_: &S, e: Option<&E>| match e {
                    Some(e) => payload(e).map_or(Switch::Off, Switch::To),
                    None => Switch::Stay,
                }
            },
            effects,
        )
    }

    /// Like [`extracting`](Self::extracting), but an event whose payload equals
    /// the previous event's payload leaves the running effect alone.
    pub fn skipping_repeated_events<P, Fx>(
        payload: impl Fn(&E) -> Option<P> + Send + Sync + 'static,
        effects: impl Fn(P) -> Fx + Send + Sync + 'static,
    ) -> Self
    where
        P: PartialEq + Clone + Send + 'static,
        Fx: Stream<Item = E> + Send + 'static,
    {
        let payload = Arc::new(payload);
        Self::switching(
            move || {
                let payload = payload.clone();
                let mut last: Option<Option<P>> = None;
                move |_: &S, e: Option<&E>| {
                    let Some(e) = e else {
                        return Switch::Stay;
                    };
                    let value = payload(e);
                    if last.as_ref() == Some(&value) {
                        return Switch::Stay;
                    }
                    last = Some(value.clone());
                    value.map_or(Switch::Off, Switch::To)
                }
            },
            effects,
        )
    }
}

/// The sending half of [`Feedback::input`].
#[derive_ex(Clone, bound())]
pub struct Input<E> {
    senders: Arc<Mutex<SlabMap<mpsc::UnboundedSender<E>>>>,
}

impl<E: Clone> Input<E> {
    /// Send `event` to every attached instance of the feedback.
    pub fn send(&self, event: E) {
        let senders: Vec<_> = lock(&self.senders).values().cloned().collect();
        for tx in senders {
            let _ = tx.unbounded_send(event.clone());
        }
    }
}

/// One attached instance of [`Feedback::input`]. Leaves the registry when
/// dropped.
struct InputReceiver<E> {
    rx: mpsc::UnboundedReceiver<E>,
    _registration: Subscription,
}

impl<E> Stream for InputReceiver<E> {
    type Item = E;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<E>> {
        self.rx.poll_next_unpin(cx)
    }
}

/// An effect that produces no event.
pub fn none<E>() -> stream::Empty<E> {
    stream::empty()
}

/// An effect that produces a single event.
pub fn just<E>(event: E) -> stream::Once<futures::future::Ready<E>> {
    stream::once(futures::future::ready(event))
}
