use std::sync::{Arc, Mutex};

use assert_call::{call, CallRecorder};
use futures::{stream, Stream, StreamExt};
use loopgate::{just, Feedback, Loop, LoopBox};

fn append(s: &mut String, e: &String) {
    s.push_str(e);
}

fn replace(s: &mut String, e: &String) {
    s.clone_from(e);
}

struct OnDrop(&'static str);
impl Drop for OnDrop {
    fn drop(&mut self) {
        call!("{}", self.0);
    }
}

fn never() -> impl Stream<Item = String> + Send {
    call!("started");
    let guard = OnDrop("cancelled");
    stream::pending().map(move |e| {
        let _guard = &guard;
        e
    })
}

fn last(values: &Mutex<Vec<String>>) -> Option<String> {
    values.lock().unwrap().last().cloned()
}

#[test]
fn when_becomes_true_positive_edge() {
    let received = Arc::new(Mutex::new(Vec::new()));
    let feedback = Feedback::when_becomes_true(|s: &String| s.ends_with('_'), {
        let received = received.clone();
        move |s: String| {
            received.lock().unwrap().push(s);
            just("feedback_".to_string())
        }
    });
    let l = Loop::new(String::new(), append, [feedback]);
    assert_eq!(l.state(), "");

    l.send("hello".into());
    assert_eq!(l.state(), "hello");
    assert_eq!(last(&received), None);

    l.send("_".into());
    assert_eq!(l.state(), "hello_feedback_");
    assert_eq!(last(&received).as_deref(), Some("hello_"));

    // Still true: no transition.
    l.send("_".into());
    assert_eq!(l.state(), "hello_feedback__");
    assert_eq!(last(&received).as_deref(), Some("hello_"));

    l.send("world".into());
    assert_eq!(l.state(), "hello_feedback__world");
    assert_eq!(last(&received).as_deref(), Some("hello_"));

    l.send("_".into());
    assert_eq!(l.state(), "hello_feedback__world_feedback_");
    assert_eq!(last(&received).as_deref(), Some("hello_feedback__world_"));
}

#[test]
fn when_becomes_true_negative_edge() {
    let mut cr = CallRecorder::new();
    let feedback = Feedback::when_becomes_true(|s: &String| s.ends_with('_'), |_| never());
    let l = Loop::new(String::new(), append, [feedback]);
    cr.verify(());

    l.send("_".into());
    cr.verify("started");
    l.send("_".into());
    l.send("_".into());
    cr.verify(());

    l.send("word".into());
    cr.verify("cancelled");
}

#[test]
fn first_value_after_nil_positive_edge() {
    let received = Arc::new(Mutex::new(Vec::new()));
    let feedback = Feedback::first_value_after_nil(
        |s: &String| s.starts_with("hello").then(|| s.clone()),
        {
            let received = received.clone();
            move |s: String| {
                received.lock().unwrap().push(s.clone());
                just(s.repeat(2))
            }
        },
    );
    let l = Loop::new(String::new(), replace, [feedback]);
    assert_eq!(l.state(), "");
    assert_eq!(last(&received), None);

    l.send("hello#".into());
    assert_eq!(l.state(), "hello#hello#");
    assert_eq!(last(&received).as_deref(), Some("hello#"));

    // Still a value: no transition.
    l.send("hello_world".into());
    assert_eq!(l.state(), "hello_world");
    assert_eq!(last(&received).as_deref(), Some("hello#"));

    l.send("goodbye".into());
    assert_eq!(l.state(), "goodbye");
    assert_eq!(last(&received).as_deref(), Some("hello#"));

    l.send("hello_it_is_me#".into());
    assert_eq!(l.state(), "hello_it_is_me#hello_it_is_me#");
    assert_eq!(last(&received).as_deref(), Some("hello_it_is_me#"));
}

#[test]
fn first_value_after_nil_negative_edge() {
    let mut cr = CallRecorder::new();
    let feedback = Feedback::first_value_after_nil(
        |s: &String| s.starts_with("hello").then(|| s.clone()),
        |_| never(),
    );
    let l = Loop::new(String::new(), replace, [feedback]);
    cr.verify(());

    l.send("hello1".into());
    cr.verify("started");
    l.send("hello2".into());
    l.send("hello3".into());
    cr.verify(());

    l.send("world".into());
    cr.verify("cancelled");
}

#[test]
fn first_value_after_nil_fires_on_initial_value() {
    let mut cr = CallRecorder::new();
    let feedback = Feedback::first_value_after_nil(
        |s: &String| s.starts_with("hello").then(|| s.clone()),
        |_| never(),
    );
    let l = Loop::new("hello".to_string(), replace, [feedback]);
    cr.verify("started");
    drop(l);
    cr.verify("cancelled");
}
