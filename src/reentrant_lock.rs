use std::{
    marker::PhantomData,
    ops::Deref,
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    thread::{self, ThreadId},
};

#[cfg(test)]
mod tests;

/// A mutual exclusion lock that can be re-acquired by the thread that owns it,
/// and that tells the caller whether an acquisition was a re-entry.
///
/// Only shared access to the protected value is given out. Use interior
/// mutability (e.g. `RefCell`) for data that the owner mutates.
pub struct ReentrantLock<T> {
    owner: Mutex<Ownership>,
    released: Condvar,
    data: T,
}

#[derive(Default)]
struct Ownership {
    thread: Option<ThreadId>,
    depth: usize,
}

// SAFETY: `data` is only reachable through a `ReentrantLockGuard`, and guards
// only exist on the single thread recorded in `owner`.
unsafe impl<T: Send> Sync for ReentrantLock<T> {}

impl<T> ReentrantLock<T> {
    pub fn new(data: T) -> Self {
        Self {
            owner: Mutex::new(Ownership::default()),
            released: Condvar::new(),
            data,
        }
    }

    /// Acquire the lock, waiting while another thread owns it.
    pub fn lock(&self) -> ReentrantLockGuard<'_, T> {
        let me = thread::current().id();
        let mut o = self.ownership();
        loop {
            if let Some(guard) = self.acquire(&mut o, me) {
                return guard;
            }
            o = self
                .released
                .wait(o)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Acquire the lock if it is free or already owned by the current thread.
    pub fn try_lock(&self) -> Option<ReentrantLockGuard<'_, T>> {
        let mut o = self.ownership();
        self.acquire(&mut o, thread::current().id())
    }

    /// Acquire the lock and run `f` with the protected value and a flag telling
    /// whether the acquisition was reentrant.
    pub fn perform<R>(&self, f: impl FnOnce(&T, bool) -> R) -> R {
        let guard = self.lock();
        f(&guard, guard.is_reentrant())
    }

    /// Like [`perform`](Self::perform), but returns `None` without waiting if
    /// another thread owns the lock.
    pub fn try_perform<R>(&self, f: impl FnOnce(&T, bool) -> R) -> Option<R> {
        let guard = self.try_lock()?;
        Some(f(&guard, guard.is_reentrant()))
    }

    fn ownership(&self) -> MutexGuard<'_, Ownership> {
        self.owner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire(&self, o: &mut Ownership, me: ThreadId) -> Option<ReentrantLockGuard<'_, T>> {
        let is_reentrant = match o.thread {
            None => {
                o.thread = Some(me);
                false
            }
            Some(owner) if owner == me => true,
            Some(_) => return None,
        };
        o.depth += 1;
        Some(ReentrantLockGuard {
            lock: self,
            is_reentrant,
            _not_send: PhantomData,
        })
    }

    fn release(&self) {
        let mut o = self.ownership();
        o.depth -= 1;
        if o.depth == 0 {
            o.thread = None;
            drop(o);
            self.released.notify_one();
        }
    }
}

impl<T: Default> Default for ReentrantLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[must_use]
pub struct ReentrantLockGuard<'a, T> {
    lock: &'a ReentrantLock<T>,
    is_reentrant: bool,
    _not_send: PhantomData<*const ()>,
}

impl<T> ReentrantLockGuard<'_, T> {
    /// `true` if the current thread already owned the lock when this guard was
    /// acquired.
    pub fn is_reentrant(&self) -> bool {
        self.is_reentrant
    }
}
impl<T> Deref for ReentrantLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.lock.data
    }
}
impl<T> Drop for ReentrantLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release();
    }
}
