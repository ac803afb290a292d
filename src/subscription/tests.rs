use super::*;
use assert_call::{call, CallRecorder};
use std::sync::atomic::{AtomicI32, Ordering};

fn on_unsubscribe(arc: Arc<AtomicI32>) {
    call!("{}", arc.load(Ordering::SeqCst));
}

#[test]
fn from_fn_calls_on_drop() {
    let mut cr = CallRecorder::new();
    {
        let _s = Subscription::from_fn(|| call!("drop"));
    }
    cr.verify("drop");
}

#[test]
fn dispose_calls_immediately() {
    let mut cr = CallRecorder::new();
    let s = Subscription::from_fn(|| call!("drop"));
    cr.verify(());
    s.dispose();
    cr.verify("drop");
}

#[test]
fn from_weak_fn_calls_when_alive() {
    let mut cr = CallRecorder::new();
    let arc = Arc::new(AtomicI32::new(9));
    let weak = Arc::downgrade(&arc);
    {
        let _s = Subscription::from_weak_fn(weak, on_unsubscribe);
    }
    cr.verify("9");
}

#[test]
fn from_weak_fn_noop_when_dead() {
    let mut cr = CallRecorder::new();
    let arc = Arc::new(AtomicI32::new(1));
    let weak = Arc::downgrade(&arc);
    drop(arc);
    {
        let _s = Subscription::from_weak_fn(weak, on_unsubscribe);
    }
    cr.verify(());
}

#[test]
fn collected_subscriptions_drop_together() {
    let mut cr = CallRecorder::new();
    let s: Subscription = (0..3)
        .map(|i| Subscription::from_fn(move || call!("drop {i}")))
        .collect();
    cr.verify(());
    drop(s);
    cr.verify(["drop 0", "drop 1", "drop 2"]);
}

#[test]
fn is_empty() {
    assert!(Subscription::empty().is_empty());
    assert!(Subscription::from_iter([Subscription::empty()]).is_empty());
    assert!(!Subscription::from_fn(|| {}).is_empty());
}
