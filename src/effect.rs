use std::{
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    task::{Context, Poll, Wake, Waker},
};

use futures::{stream::BoxStream, Stream, StreamExt};

use crate::reentrant_lock::ReentrantLock;


const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const NOTIFIED: u8 = 2;
const COMPLETED: u8 = 3;
const CANCELLED: u8 = 4;

/// Drives an effect stream without an executor.
///
/// The stream is polled on the thread that spawns it and, after it returns
/// `Pending`, on whichever thread wakes it. Only one thread polls at a time.
pub(crate) struct EffectTask<E> {
    state: AtomicU8,
    stream: Mutex<Option<BoxStream<'static, E>>>,
    delivery: ReentrantLock<()>,
    deliver: Box<dyn Fn(E) + Send + Sync>,
}

impl<E: Send + 'static> EffectTask<E> {
    pub fn spawn(
        stream: impl Stream<Item = E> + Send + 'static,
        deliver: impl Fn(E) + Send + Sync + 'static,
    ) -> Arc<Self> {
        let task = Arc::new(Self {
            state: AtomicU8::new(RUNNING),
            stream: Mutex::new(Some(stream.boxed())),
            delivery: ReentrantLock::new(()),
            deliver: Box::new(deliver),
        });
        task.run();
        task
    }

    /// Stop the task.
    ///
    /// Never waits for a poll in progress. If an event is being delivered on
    /// another thread, waits for that delivery to finish, so no event of this
    /// task reaches the consumer after `cancel` returns.
    pub fn cancel(&self) {
        match self.state.swap(CANCELLED, Ordering::AcqRel) {
            IDLE => self.release(),
            RUNNING | NOTIFIED | COMPLETED | CANCELLED => {}
            _ => unreachable!(),
        }
        drop(self.delivery.lock());
    }

    fn schedule(self: &Arc<Self>) {
        let mut state = self.state.load(Ordering::Acquire);
        loop {
            let next = match state {
                IDLE => RUNNING,
                RUNNING => NOTIFIED,
                _ => return,
            };
            match self
                .state
                .compare_exchange(state, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) if next == RUNNING => return self.run(),
                Ok(_) => return,
                Err(s) => state = s,
            }
        }
    }

    fn run(self: &Arc<Self>) {
        let waker = Waker::from(self.clone());
        let mut cx = Context::from_waker(&waker);
        loop {
            if self.state.load(Ordering::Acquire) == CANCELLED {
                return self.release();
            }
            let next = match self.lock_stream().as_mut() {
                Some(stream) => stream.poll_next_unpin(&mut cx),
                None => return,
            };
            match next {
                Poll::Ready(Some(event)) => self.deliver(event),
                Poll::Ready(None) => {
                    self.release();
                    let _ = self.state.compare_exchange(
                        RUNNING,
                        COMPLETED,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    );
                    let _ = self.state.compare_exchange(
                        NOTIFIED,
                        COMPLETED,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    );
                    return;
                }
                Poll::Pending => {
                    match self.state.compare_exchange(
                        RUNNING,
                        IDLE,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => return,
                        Err(NOTIFIED) => {
                            if self
                                .state
                                .compare_exchange(
                                    NOTIFIED,
                                    RUNNING,
                                    Ordering::AcqRel,
                                    Ordering::Acquire,
                                )
                                .is_err()
                            {
                                return self.release();
                            }
                        }
                        Err(_) => return self.release(),
                    }
                }
            }
        }
    }

    fn deliver(&self, event: E) {
        let _delivery = self.delivery.lock();
        if self.state.load(Ordering::Acquire) != CANCELLED {
            (self.deliver)(event);
        }
    }

    fn release(&self) {
        let stream = self.lock_stream().take();
        drop(stream);
    }

    fn lock_stream(&self) -> MutexGuard<'_, Option<BoxStream<'static, E>>> {
        self.stream.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E: Send + 'static> Wake for EffectTask<E> {
    fn wake(self: Arc<Self>) {
        self.schedule();
    }
    fn wake_by_ref(self: &Arc<Self>) {
        self.schedule();
    }
}
