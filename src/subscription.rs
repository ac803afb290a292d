use std::{
    fmt,
    mem::take,
    sync::{Arc, Weak},
};

#[cfg(test)]
mod tests;

/// A handle to a running subscription.
///
/// Dropping the handle cancels the subscription.
#[derive(Default)]
#[must_use]
pub struct Subscription(RawSubscription);

impl Subscription {
    pub fn empty() -> Self {
        Subscription(RawSubscription::Empty)
    }
    pub fn from_fn(f: impl FnOnce() + Send + 'static) -> Self {
        Subscription(RawSubscription::Fn(Box::new(f)))
    }
    pub fn from_weak_fn<T: Send + Sync + 'static>(
        this: Weak<T>,
        unsubscribe: impl FnOnce(Arc<T>) + Send + 'static,
    ) -> Self {
        Self::from_fn(move || {
            if let Some(this) = this.upgrade() {
                unsubscribe(this)
            }
        })
    }

    /// Cancel the subscription now.
    pub fn dispose(self) {}

    pub fn is_empty(&self) -> bool {
        match &self.0 {
            RawSubscription::Empty => true,
            RawSubscription::Many(items) => items.iter().all(|s| s.is_empty()),
            _ => false,
        }
    }
}
impl Drop for Subscription {
    fn drop(&mut self) {
        match take(&mut self.0) {
            RawSubscription::Empty => {}
            RawSubscription::Fn(f) => f(),
            RawSubscription::Many(items) => drop(items),
        }
    }
}
impl FromIterator<Subscription> for Subscription {
    fn from_iter<T: IntoIterator<Item = Subscription>>(iter: T) -> Self {
        Subscription(RawSubscription::Many(iter.into_iter().collect()))
    }
}
impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.0 {
            RawSubscription::Empty => "Empty",
            RawSubscription::Fn(_) => "Fn",
            RawSubscription::Many(_) => "Many",
        };
        f.debug_tuple("Subscription").field(&kind).finish()
    }
}

#[derive(Default)]
enum RawSubscription {
    #[default]
    Empty,
    Fn(Box<dyn FnOnce() + Send + 'static>),
    Many(Vec<Subscription>),
}
