use std::{fmt, sync::Arc};

use log::debug;
use parse_display::Display;

use crate::{
    floodgate::Floodgate, loop_box::LoopControl, reducer::Reducer, Feedback, LoopBox, Result,
    ScopedLoop, StateStream, Subscription, Token,
};


/// What a paused loop does with the events sent to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
#[display(style = "snake_case")]
pub enum PausePolicy {
    /// Keep the events and apply them, in order, when the loop resumes.
    #[default]
    Buffer,
    /// Drop the events. [`LoopBox::try_send`] reports [`Error::Paused`](crate::Error::Paused).
    Discard,
}

/// A state container driven by a reducer and a set of feedbacks.
///
/// The state changes only by applying events, one at a time, in the order in
/// which they were enqueued. Feedbacks observe the state and enqueue the
/// events produced by their effects.
///
/// Dropping the loop stops every feedback and ends every state feed.
pub struct Loop<S: 'static, E: 'static> {
    floodgate: Arc<Floodgate<S, E>>,
    token: Token,
}

impl<S: Send + 'static, E: Send + 'static> Loop<S, E> {
    pub fn new(
        initial: S,
        reducer: impl Fn(&mut S, &E) + Send + Sync + 'static,
        feedbacks: impl IntoIterator<Item = Feedback<S, E>>,
    ) -> Self {
        Self::builder(initial, reducer).feedbacks(feedbacks).build()
    }

    pub fn builder(
        initial: S,
        reducer: impl Fn(&mut S, &E) + Send + Sync + 'static,
    ) -> LoopBuilder<S, E> {
        LoopBuilder {
            initial,
            reducer: Box::new(reducer),
            name: "loop".into(),
            feedbacks: Vec::new(),
            policy: PausePolicy::default(),
        }
    }

    /// Call `f` with the current state, then with every later state and the
    /// event that produced it.
    pub fn observe(&self, f: impl FnMut(&S, Option<&E>) + Send + 'static) -> Subscription {
        self.floodgate.observe(Box::new(f))
    }

    /// A stream of the current state, then of every later state paired with
    /// the event that produced it.
    pub fn changes(&self) -> StateStream<(S, Option<E>)>
    where
        S: Clone,
        E: Clone,
    {
        let floodgate = self.floodgate.clone();
        StateStream::new(move |tx| {
            floodgate.observe(Box::new(move |s: &S, e: Option<&E>| {
                let _ = tx.unbounded_send((s.clone(), e.cloned()));
            }))
        })
    }

    /// Turn the loop into a stream of its states.
    ///
    /// The loop runs for as long as the stream lives.
    pub fn into_states(self) -> StateStream<S>
    where
        S: Clone,
    {
        self.states().with_owner(self)
    }

    /// A scoped view of the whole state.
    pub fn to_scoped(&self) -> ScopedLoop<S, E> {
        let view = self.floodgate.clone();
        let subscribe = self.floodgate.clone();
        let send = self.floodgate.clone();
        let token = self.token;
        ScopedLoop::new(
            move |f: &mut dyn FnMut(&S)| view.with_state(|s, _| f(s)),
            move |mut f: Box<dyn FnMut(&S) + Send>| {
                subscribe.observe(Box::new(move |s: &S, _: Option<&E>| f(s)))
            },
            move |e| send.send(e, token),
            self.floodgate.clone() as Arc<dyn LoopControl>,
        )
    }
}

impl<S: Send + 'static, E: Send + 'static> LoopBox<S, E> for Loop<S, E> {
    fn name(&self) -> &str {
        self.floodgate.name()
    }

    fn try_send(&self, event: E) -> Result<()> {
        self.floodgate.send(event, self.token)
    }

    fn with_state<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        self.floodgate.with_state(|s, _| f(s))
    }

    fn subscribe(&self, mut f: impl FnMut(&S) + Send + 'static) -> Subscription {
        self.observe(move |s, _| f(s))
    }

    fn states(&self) -> StateStream<S>
    where
        S: Clone + Send,
    {
        let floodgate = self.floodgate.clone();
        StateStream::new(move |tx| {
            floodgate.observe(Box::new(move |s: &S, _: Option<&E>| {
                let _ = tx.unbounded_send(s.clone());
            }))
        })
    }

    fn scoped<S2: 'static, E2: 'static>(
        &self,
        extract: impl Fn(&S) -> S2 + Send + Sync + 'static,
        embed: impl Fn(E2) -> E + Send + Sync + 'static,
    ) -> ScopedLoop<S2, E2> {
        self.to_scoped().scoped(extract, embed)
    }

    fn pause(&self) {
        self.floodgate.pause()
    }
    fn resume(&self) {
        self.floodgate.resume()
    }
    fn is_paused(&self) -> bool {
        self.floodgate.is_paused()
    }
    fn is_disposed(&self) -> bool {
        self.floodgate.is_disposed()
    }
}

impl<S: 'static, E: 'static> Drop for Loop<S, E> {
    fn drop(&mut self) {
        self.floodgate.dispose();
    }
}

impl<S: 'static, E: 'static> fmt::Debug for Loop<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loop")
            .field("name", &self.floodgate.name())
            .finish_non_exhaustive()
    }
}

/// Configuration of a [`Loop`].
#[must_use]
pub struct LoopBuilder<S: 'static, E: 'static> {
    initial: S,
    reducer: Reducer<S, E>,
    name: String,
    feedbacks: Vec<Feedback<S, E>>,
    policy: PausePolicy,
}

impl<S: Send + 'static, E: Send + 'static> LoopBuilder<S, E> {
    /// Set the name used in log records. Defaults to `loop`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn feedback(mut self, feedback: Feedback<S, E>) -> Self {
        self.feedbacks.push(feedback);
        self
    }

    pub fn feedbacks(mut self, feedbacks: impl IntoIterator<Item = Feedback<S, E>>) -> Self {
        self.feedbacks.extend(feedbacks);
        self
    }

    /// Set what happens to events sent while the loop is paused.
    pub fn while_paused(mut self, policy: PausePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Start the loop. Feedbacks see the initial state before this returns,
    /// and the events they produce synchronously are already applied.
    pub fn build(self) -> Loop<S, E> {
        let floodgate = Floodgate::new(self.name, self.initial, self.reducer, self.policy);
        floodgate.bootstrap(self.feedbacks);
        debug!("loop `{}`: started", floodgate.name());
        Loop {
            floodgate,
            token: Token::new(),
        }
    }
}
