use super::*;
use std::{
    cell::Cell,
    sync::{mpsc::channel, Arc},
    thread,
    time::Duration,
};

#[test]
fn first_acquisition_is_not_reentrant() {
    let lock = ReentrantLock::new(());
    let g = lock.lock();
    assert!(!g.is_reentrant());
}

#[test]
fn nested_acquisition_is_reentrant() {
    let lock = ReentrantLock::new(());
    let outer = lock.lock();
    let inner = lock.lock();
    assert!(!outer.is_reentrant());
    assert!(inner.is_reentrant());
    let nested_try = lock.try_lock().map(|g| g.is_reentrant());
    assert_eq!(nested_try, Some(true));
}

#[test]
fn released_after_outermost_guard() {
    let lock = ReentrantLock::new(());
    let outer = lock.lock();
    let inner = lock.lock();
    let held_elsewhere = || {
        thread::scope(|s| s.spawn(|| lock.try_lock().is_none()).join().unwrap())
    };
    drop(inner);
    assert!(held_elsewhere());
    drop(outer);
    assert!(!held_elsewhere());
    assert!(!lock.lock().is_reentrant());
}

#[test]
fn perform_reports_reentrancy() {
    let lock = ReentrantLock::new(Cell::new(0));
    let flags = lock.perform(|value, outer| {
        value.set(1);
        let inner = lock.perform(|value, inner| {
            value.set(value.get() + 1);
            inner
        });
        (outer, inner)
    });
    assert_eq!(flags, (false, true));
    assert_eq!(lock.perform(|v, _| v.get()), 2);
}

#[test]
fn try_lock_fails_while_other_thread_owns() {
    let lock = Arc::new(ReentrantLock::new(()));
    let (locked_tx, locked_rx) = channel();
    let (release_tx, release_rx) = channel::<()>();
    let handle = {
        let lock = lock.clone();
        std::thread::spawn(move || {
            let _g = lock.lock();
            locked_tx.send(()).unwrap();
            release_rx.recv().unwrap();
        })
    };
    locked_rx.recv().unwrap();
    assert!(lock.try_lock().is_none());
    assert_eq!(lock.try_perform(|_, _| ()), None);
    release_tx.send(()).unwrap();
    handle.join().unwrap();
    assert!(lock.try_lock().is_some());
}

#[test]
fn lock_waits_for_other_thread() {
    let lock = Arc::new(ReentrantLock::new(Cell::new(0)));
    let (locked_tx, locked_rx) = channel();
    let handle = {
        let lock = lock.clone();
        std::thread::spawn(move || {
            let g = lock.lock();
            locked_tx.send(()).unwrap();
            std::thread::sleep(Duration::from_millis(50));
            g.set(10);
        })
    };
    locked_rx.recv().unwrap();
    let seen = lock.perform(|v, reentrant| {
        assert!(!reentrant);
        v.get()
    });
    assert_eq!(seen, 10);
    handle.join().unwrap();
}
