use std::{
    cell::RefCell,
    collections::{BTreeMap, VecDeque},
    mem::{replace, take},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, Weak,
    },
};

use log::{debug, trace};

use crate::{
    loop_box::LoopControl, reducer::Reducer, reentrant_lock::ReentrantLock, states::Observer,
    Consumer, Error, EventConsumer, Feedback, PausePolicy, Result, States, Subscription, Token,
};


/// Owns the state, the reducer and the event queue of one loop.
///
/// Events are applied by whichever thread manages to take the reducer lock
/// non-reentrantly. Every other caller only enqueues and leaves, relying on
/// the lock owner to drain what it left behind.
pub(crate) struct Floodgate<S: 'static, E: 'static> {
    this: Weak<Self>,
    name: String,
    policy: PausePolicy,
    state: ReentrantLock<RefCell<S>>,
    reducer: Reducer<S, E>,
    queue: Mutex<QueueState<E>>,
    observers: Arc<Observers<S, E>>,
    plug: Mutex<Plug<S, E>>,
    has_started: AtomicBool,
}

struct QueueState<E> {
    events: VecDeque<(E, Token)>,
    is_outer_lifetime_ended: bool,
    phase: Phase,
    resumes: u64,
}
impl<E> QueueState<E> {
    fn has_events(&self) -> bool {
        !self.events.is_empty() && !self.is_outer_lifetime_ended && self.phase == Phase::Running
    }
}

/// Pause state. `Resuming` accepts events under every policy but keeps them
/// queued until the feedbacks are plugged again. It carries the number of the
/// `resume` call that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    Paused,
    Resuming(u64),
}

struct Plug<S: 'static, E: 'static> {
    feedbacks: Vec<Feedback<S, E>>,
    subscription: Option<Subscription>,
    is_plugged: bool,
}

impl<S: Send + 'static, E: Send + 'static> Floodgate<S, E> {
    pub fn new(name: String, initial: S, reducer: Reducer<S, E>, policy: PausePolicy) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            name,
            policy,
            state: ReentrantLock::new(RefCell::new(initial)),
            reducer,
            queue: Mutex::new(QueueState {
                events: VecDeque::new(),
                is_outer_lifetime_ended: false,
                phase: Phase::Running,
                resumes: 0,
            }),
            observers: Arc::new(Observers::new()),
            plug: Mutex::new(Plug {
                feedbacks: Vec::new(),
                subscription: None,
                is_plugged: false,
            }),
            has_started: AtomicBool::new(false),
        })
    }

    /// Subscribe every feedback to this floodgate and drain whatever they
    /// enqueued while starting.
    pub fn bootstrap(&self, feedbacks: Vec<Feedback<S, E>>) {
        debug!(
            "loop `{}`: bootstrapping with {} feedback(s)",
            self.name,
            feedbacks.len()
        );
        lock(&self.plug).feedbacks = feedbacks;
        self.plug_feedbacks();
        self.has_started.store(true, Ordering::Release);
        self.process_enqueued_events();
    }

    pub fn has_started(&self) -> bool {
        self.has_started.load(Ordering::Acquire)
    }

    /// Enqueue `event` and try to drain the queue.
    pub fn send(&self, event: E, token: Token) -> Result<()> {
        self.enqueue(event, token)?;
        self.process_enqueued_events();
        Ok(())
    }

    /// Run `f` with the current state and whether the floodgate has started.
    ///
    /// If this call is not nested inside another acquisition of the reducer
    /// lock on this thread, it drains the queue afterwards: events may have
    /// been enqueued while the lock was held, and their senders gave up on
    /// draining them.
    pub fn with_state<R>(&self, f: impl FnOnce(&S, bool) -> R) -> R {
        let (result, is_reentrant) = self.state.perform(|state, is_reentrant| {
            (f(&state.borrow(), self.has_started()), is_reentrant)
        });
        if !is_reentrant {
            self.process_enqueued_events();
        }
        result
    }

    /// Observe the current state, then every state change with its causing event.
    pub fn observe(&self, observer: Observer<S, E>) -> Subscription {
        let entry = Arc::new(ObserverEntry::new(observer));
        self.with_state(|state, _| {
            entry.notify(state, None);
            self.observers.insert(&entry)
        })
    }

    pub fn states(&self) -> States<S, E> {
        let this = self.this.clone();
        States::new(move |observer| match this.upgrade() {
            Some(this) => this.observe(observer),
            None => Subscription::empty(),
        })
    }

    pub fn consumer(&self) -> Consumer<E> {
        Consumer::new(Inlet(self.this.clone()))
    }

    pub fn plug_feedbacks(&self) {
        let feedbacks = {
            let mut plug = lock(&self.plug);
            if plug.is_plugged || self.is_disposed() {
                return;
            }
            plug.is_plugged = true;
            plug.feedbacks.clone()
        };
        let states = self.states();
        let consumer = self.consumer();
        // Hold the reducer lock so that events produced while starting are
        // applied only after every feedback observes the state.
        let subscription: Subscription = self.state.perform(|_, _| {
            feedbacks
                .iter()
                .map(|feedback| feedback.run(states.clone(), consumer.clone()))
                .collect()
        });

        let mut plug = lock(&self.plug);
        if plug.is_plugged && plug.subscription.is_none() && !self.is_disposed() {
            plug.subscription = Some(subscription);
        } else {
            drop(plug);
            drop(subscription);
        }
    }

    /// Detach the feedbacks and stop draining until [`resume`](Self::resume).
    ///
    /// A pause that lands while [`resume`](Self::resume) is plugging wins: the
    /// feedbacks end up unplugged.
    pub fn pause(&self) {
        let was = replace(&mut lock(&self.queue).phase, Phase::Paused);
        if was != Phase::Paused {
            debug!("loop `{}`: paused ({})", self.name, self.policy);
            self.unplug_feedbacks();
        }
    }

    /// Reattach the feedbacks, replaying the current state to them, then drain
    /// the events that were held back while paused.
    pub fn resume(&self) {
        let id = {
            let mut queue = lock(&self.queue);
            if queue.phase != Phase::Paused {
                return;
            }
            queue.resumes += 1;
            queue.phase = Phase::Resuming(queue.resumes);
            queue.resumes
        };
        self.plug_feedbacks();
        let mut queue = lock(&self.queue);
        let phase = queue.phase;
        match phase {
            Phase::Resuming(owner) if owner == id => queue.phase = Phase::Running,
            Phase::Paused => {
                drop(queue);
                self.unplug_feedbacks();
                return;
            }
            // A later resume took over.
            _ => return,
        }
        let held = queue.events.len();
        drop(queue);
        debug!("loop `{}`: resumed with {held} queued event(s)", self.name);
        self.process_enqueued_events();
    }

    pub fn is_paused(&self) -> bool {
        lock(&self.queue).phase != Phase::Running
    }

    fn enqueue(&self, event: E, token: Token) -> Result<()> {
        let mut queue = lock(&self.queue);
        if queue.is_outer_lifetime_ended {
            return Err(Error::Disposed);
        }
        if queue.phase == Phase::Paused && self.policy == PausePolicy::Discard {
            return Err(Error::Paused);
        }
        queue.events.push_back((event, token));
        Ok(())
    }

    fn dequeue(&self) -> Option<E> {
        let mut queue = lock(&self.queue);
        if !queue.has_events() {
            return None;
        }
        queue.events.pop_front().map(|(event, _)| event)
    }

    fn has_events(&self) -> bool {
        lock(&self.queue).has_events()
    }

    fn process_enqueued_events(&self) {
        loop {
            // A reentrant acquisition means an outer frame on this thread is
            // already draining; draining here would publish states from inside
            // an observer that is still running.
            let drained = self
                .state
                .try_perform(|state, is_reentrant| {
                    if !is_reentrant {
                        self.drain(state);
                    }
                    !is_reentrant
                })
                .unwrap_or(false);

            // An event may have been enqueued after the last dequeue but before
            // the unlock. Its sender saw the lock busy and left it to us.
            if !(drained && self.has_events()) {
                break;
            }
        }
    }

    fn drain(&self, state: &RefCell<S>) {
        let mut applied = 0usize;
        while let Some(event) = self.dequeue() {
            (self.reducer)(&mut state.borrow_mut(), &event);
            self.observers.publish(&state.borrow(), Some(&event));
            applied += 1;
        }
        if applied > 0 {
            trace!("loop `{}`: applied {applied} event(s)", self.name);
        }
    }
}

impl<S: 'static, E: 'static> Floodgate<S, E> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unplug_feedbacks(&self) {
        let subscription = {
            let mut plug = lock(&self.plug);
            plug.is_plugged = false;
            plug.subscription.take()
        };
        drop(subscription);
    }

    pub fn is_disposed(&self) -> bool {
        lock(&self.queue).is_outer_lifetime_ended
    }

    /// End the lifetime of the floodgate. Only the first call has an effect.
    pub fn dispose(&self) {
        let unreachable = {
            let mut queue = lock(&self.queue);
            if replace(&mut queue.is_outer_lifetime_ended, true) {
                return;
            }
            take(&mut queue.events)
        };
        debug!(
            "loop `{}`: disposed, {} queued event(s) dropped",
            self.name,
            unreachable.len()
        );
        drop(unreachable);
        self.unplug_feedbacks();
        self.observers.close();
    }
}

impl<S: Send + 'static, E: Send + 'static> EventConsumer<E> for Floodgate<S, E> {
    fn process(&self, event: E, token: Token) {
        if let Err(e) = self.send(event, token) {
            trace!("loop `{}`: event from {token} rejected: {e}", self.name);
        }
    }

    fn dequeue_all_events(&self, token: Token) {
        let removed = {
            let mut queue = lock(&self.queue);
            let len = queue.events.len();
            queue.events.retain(|(_, t)| *t != token);
            len - queue.events.len()
        };
        if removed > 0 {
            trace!(
                "loop `{}`: purged {removed} event(s) of {token}",
                self.name
            );
        }
    }
}

impl<S: Send + 'static, E: Send + 'static> LoopControl for Floodgate<S, E> {
    fn name(&self) -> &str {
        &self.name
    }
    fn pause(&self) {
        Floodgate::pause(self)
    }
    fn resume(&self) {
        Floodgate::resume(self)
    }
    fn is_paused(&self) -> bool {
        Floodgate::is_paused(self)
    }
    fn is_disposed(&self) -> bool {
        Floodgate::is_disposed(self)
    }
}

/// The consumer given to feedbacks. Holds the floodgate weakly, so running
/// effects do not keep a released loop alive.
struct Inlet<S: 'static, E: 'static>(Weak<Floodgate<S, E>>);

impl<S: Send + 'static, E: Send + 'static> EventConsumer<E> for Inlet<S, E> {
    fn process(&self, event: E, token: Token) {
        if let Some(floodgate) = self.0.upgrade() {
            floodgate.process(event, token);
        }
    }
    fn dequeue_all_events(&self, token: Token) {
        if let Some(floodgate) = self.0.upgrade() {
            floodgate.dequeue_all_events(token);
        }
    }
}

struct ObserverEntry<S, E> {
    f: Mutex<Observer<S, E>>,
    is_active: AtomicBool,
}
impl<S, E> ObserverEntry<S, E> {
    fn new(f: Observer<S, E>) -> Self {
        Self {
            f: Mutex::new(f),
            is_active: AtomicBool::new(true),
        }
    }
    fn notify(&self, state: &S, event: Option<&E>) {
        if self.is_active.load(Ordering::Acquire) {
            let mut f = lock(&self.f);
            (*f)(state, event);
        }
    }
}

/// Observers in subscription order.
struct Observers<S, E> {
    data: Mutex<ObserversData<S, E>>,
    next_id: AtomicU64,
}
struct ObserversData<S, E> {
    entries: BTreeMap<u64, Arc<ObserverEntry<S, E>>>,
    is_closed: bool,
}

impl<S: 'static, E: 'static> Observers<S, E> {
    fn new() -> Self {
        Self {
            data: Mutex::new(ObserversData {
                entries: BTreeMap::new(),
                is_closed: false,
            }),
            next_id: AtomicU64::new(0),
        }
    }

    fn insert(self: &Arc<Self>, entry: &Arc<ObserverEntry<S, E>>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut d = lock(&self.data);
            if d.is_closed {
                return Subscription::empty();
            }
            d.entries.insert(id, entry.clone());
        }
        Subscription::from_weak_fn(Arc::downgrade(self), move |this| this.remove(id))
    }

    fn remove(&self, id: u64) {
        let entry = lock(&self.data).entries.remove(&id);
        if let Some(entry) = entry {
            entry.is_active.store(false, Ordering::Release);
        }
    }

    fn publish(&self, state: &S, event: Option<&E>) {
        let entries: Vec<_> = lock(&self.data).entries.values().cloned().collect();
        for entry in &entries {
            entry.notify(state, event);
        }
    }

    fn close(&self) {
        let entries = {
            let mut d = lock(&self.data);
            d.is_closed = true;
            take(&mut d.entries)
        };
        for entry in entries.values() {
            entry.is_active.store(false, Ordering::Release);
        }
    }
}

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
