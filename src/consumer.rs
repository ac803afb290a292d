use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use derive_ex::derive_ex;
use futures::Stream;
use parse_display::Display;

use crate::{effect::EffectTask, Subscription};

#[cfg(test)]
mod tests;

/// Identifies the events enqueued by one effect subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("#{0}")]
pub struct Token(u64);

impl Token {
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}
impl Default for Token {
    fn default() -> Self {
        Self::new()
    }
}

/// A sink for events produced by feedbacks.
///
/// `process` may be called from any thread, concurrently, and from inside a
/// state observer that is itself running on behalf of the consumer.
pub trait EventConsumer<E>: Send + Sync {
    fn process(&self, event: E, token: Token);

    /// Remove every queued event tagged with `token` that has not been applied yet.
    fn dequeue_all_events(&self, token: Token);
}

#[derive_ex(Clone, bound())]
pub struct Consumer<E: 'static>(Arc<dyn EventConsumer<E>>);

impl<E: 'static> Consumer<E> {
    pub fn new(consumer: impl EventConsumer<E> + 'static) -> Self {
        Self(Arc::new(consumer))
    }
    pub fn from_arc(consumer: Arc<dyn EventConsumer<E>>) -> Self {
        Self(consumer)
    }

    pub fn process(&self, event: E, token: Token) {
        self.0.process(event, token)
    }
    pub fn dequeue_all_events(&self, token: Token) {
        self.0.dequeue_all_events(token)
    }

    /// Create a consumer of local events that embeds them into `E`.
    pub fn pullback<L: 'static>(&self, embed: impl Fn(L) -> E + Send + Sync + 'static) -> Consumer<L> {
        Consumer::new(Pullback {
            consumer: self.clone(),
            embed,
        })
    }
}

impl<E: Send + 'static> Consumer<E> {
    /// Enqueue every event of `effect`.
    ///
    /// Dropping the returned [`Subscription`] stops the effect and removes its
    /// events that are still waiting in the queue.
    pub fn enqueue(&self, effect: impl Stream<Item = E> + Send + 'static) -> Subscription {
        let token = Token::new();
        let task = self.spawn(effect, token);
        let consumer = self.clone();
        Subscription::from_fn(move || {
            task.cancel();
            consumer.dequeue_all_events(token);
        })
    }

    /// Enqueue every event of `effect`.
    ///
    /// Dropping the returned [`Subscription`] stops the effect, but events that
    /// are already queued are still applied.
    pub fn enqueue_non_cancelling(
        &self,
        effect: impl Stream<Item = E> + Send + 'static,
    ) -> Subscription {
        let task = self.spawn(effect, Token::new());
        Subscription::from_fn(move || task.cancel())
    }

    fn spawn(
        &self,
        effect: impl Stream<Item = E> + Send + 'static,
        token: Token,
    ) -> Arc<EffectTask<E>> {
        let consumer = self.clone();
        EffectTask::spawn(effect, move |event| consumer.process(event, token))
    }
}

struct Pullback<E: 'static, F> {
    consumer: Consumer<E>,
    embed: F,
}
impl<E, L, F> EventConsumer<L> for Pullback<E, F>
where
    E: 'static,
    F: Fn(L) -> E + Send + Sync,
{
    fn process(&self, event: L, token: Token) {
        self.consumer.process((self.embed)(event), token)
    }
    fn dequeue_all_events(&self, token: Token) {
        self.consumer.dequeue_all_events(token)
    }
}
