use std::sync::Arc;

use derive_ex::derive_ex;

use crate::Subscription;

pub(crate) type Observer<S, E> = Box<dyn FnMut(&S, Option<&E>) + Send>;

/// The state feed handed to a feedback.
///
/// Each call to [`observe`](Self::observe) first replays the current state
/// (with no causing event), then reports every later state together with the
/// event that produced it, until the returned [`Subscription`] is dropped.
///
/// The feed is only eventually consistent with events enqueued by the
/// observer itself: an event sent from inside the callback is not reflected
/// by the state passed to that same call.
#[derive_ex(Clone, bound())]
pub struct States<S: 'static, E: 'static>(
    Arc<dyn Fn(Observer<S, E>) -> Subscription + Send + Sync>,
);

impl<S: 'static, E: 'static> States<S, E> {
    pub(crate) fn new(subscribe: impl Fn(Observer<S, E>) -> Subscription + Send + Sync + 'static) -> Self {
        Self(Arc::new(subscribe))
    }

    pub fn observe(&self, f: impl FnMut(&S, Option<&E>) + Send + 'static) -> Subscription {
        (self.0)(Box::new(f))
    }

    /// Project the feed onto a part of the state and a subset of the events.
    ///
    /// Events for which `extract` returns `None` are reported as `None`.
    pub fn map<S2: 'static, E2: 'static>(
        &self,
        value: impl Fn(&S) -> S2 + Send + Sync + 'static,
        extract: impl Fn(&E) -> Option<E2> + Send + Sync + 'static,
    ) -> States<S2, E2> {
        let this = self.clone();
        let value = Arc::new(value);
        let extract = Arc::new(extract);
        States::new(move |mut f: Observer<S2, E2>| {
            let value = value.clone();
            let extract = extract.clone();
            this.observe(move |s, e| {
                let e = e.and_then(|e| extract(e));
                f(&value(s), e.as_ref())
            })
        })
    }
}
