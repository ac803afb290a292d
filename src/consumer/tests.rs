use super::*;
use assert_call::{call, CallRecorder};
use futures::{channel::mpsc, stream};
use std::sync::Mutex;

/// Records calls and keeps a queue that can be purged by token.
#[derive(Default)]
struct Recorder {
    queue: Mutex<Vec<(String, Token)>>,
}

impl Recorder {
    fn queued(&self) -> Vec<String> {
        self.queue
            .lock()
            .unwrap()
            .iter()
            .map(|(e, _)| e.clone())
            .collect()
    }
}

impl EventConsumer<String> for Recorder {
    fn process(&self, event: String, token: Token) {
        call!("process {event}");
        self.queue.lock().unwrap().push((event, token));
    }
    fn dequeue_all_events(&self, token: Token) {
        call!("dequeue");
        self.queue.lock().unwrap().retain(|(_, t)| *t != token);
    }
}

fn recorder() -> (Arc<Recorder>, Consumer<String>) {
    let r = Arc::new(Recorder::default());
    (r.clone(), Consumer::from_arc(r))
}

#[test]
fn token_display() {
    let t = Token::new();
    assert_eq!(t.to_string(), format!("#{}", t.0));
    assert_ne!(Token::new(), Token::new());
}

#[test]
fn pullback_embeds_events() {
    let mut cr = CallRecorder::new();
    let (_, c) = recorder();
    let local: Consumer<i32> = c.pullback(|x: i32| format!("n{x}"));
    local.process(5, Token::new());
    cr.verify("process n5");
}

#[test]
fn enqueue_delivers_ready_events_immediately() {
    let mut cr = CallRecorder::new();
    let (r, c) = recorder();
    let _s = c.enqueue(stream::iter(["a".to_string(), "b".to_string()]));
    cr.verify(["process a", "process b"]);
    assert_eq!(r.queued(), vec!["a", "b"]);
}

#[test]
fn enqueue_drop_purges_its_own_events() {
    let mut cr = CallRecorder::new();
    let (r, c) = recorder();
    let other = c.enqueue(stream::iter(["x".to_string()]));
    let s = c.enqueue(stream::iter(["a".to_string()]));
    cr.verify(["process x", "process a"]);
    drop(s);
    cr.verify("dequeue");
    assert_eq!(r.queued(), vec!["x"]);
    drop(other);
    cr.verify("dequeue");
}

#[test]
fn enqueue_drop_stops_pending_effect() {
    let mut cr = CallRecorder::new();
    let (_, c) = recorder();
    let (tx, rx) = mpsc::unbounded();
    let s = c.enqueue(rx);
    tx.unbounded_send("a".to_string()).unwrap();
    cr.verify("process a");
    drop(s);
    cr.verify("dequeue");
    assert!(tx.unbounded_send("b".to_string()).is_err());
    cr.verify(());
}

#[test]
fn enqueue_non_cancelling_keeps_queued_events() {
    let mut cr = CallRecorder::new();
    let (r, c) = recorder();
    let (tx, rx) = mpsc::unbounded();
    let s = c.enqueue_non_cancelling(rx);
    tx.unbounded_send("a".to_string()).unwrap();
    cr.verify("process a");
    drop(s);
    cr.verify(());
    assert_eq!(r.queued(), vec!["a"]);
}
