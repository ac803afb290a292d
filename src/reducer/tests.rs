use super::*;

#[derive(Debug, Default, PartialEq)]
struct App {
    count: i32,
    log: Vec<String>,
    detail: Option<i32>,
}

#[derive(Debug)]
enum Event {
    Count(i32),
    Log(String),
    Detail(i32),
}

fn count(s: &mut i32, e: &i32) {
    *s += e;
}

fn count_event(e: &Event) -> Option<&i32> {
    match e {
        Event::Count(x) | Event::Detail(x) => Some(x),
        Event::Log(_) => None,
    }
}

#[test]
fn combine_applies_in_order() {
    let r: Reducer<Vec<i32>, i32> = combine([
        Box::new(|s: &mut Vec<i32>, e: &i32| s.push(*e)) as Reducer<_, _>,
        Box::new(|s: &mut Vec<i32>, e: &i32| s.push(e * 10)) as Reducer<_, _>,
    ]);
    let mut s = Vec::new();
    r(&mut s, &1);
    r(&mut s, &2);
    assert_eq!(s, vec![1, 10, 2, 20]);
}

#[test]
fn combine_empty_is_identity() {
    let r: Reducer<i32, i32> = combine([]);
    let mut s = 5;
    r(&mut s, &1);
    assert_eq!(s, 5);
}

#[test]
fn pullback_ignores_foreign_events() {
    let r = combine([
        pullback(count, |s: &mut App| &mut s.count, |e: &Event| match e {
            Event::Count(x) => Some(x),
            _ => None,
        }),
        pullback(
            |s: &mut Vec<String>, e: &String| s.push(e.clone()),
            |s: &mut App| &mut s.log,
            |e: &Event| match e {
                Event::Log(x) => Some(x),
                _ => None,
            },
        ),
    ]);
    let mut s = App::default();
    r(&mut s, &Event::Count(2));
    r(&mut s, &Event::Log("a".into()));
    r(&mut s, &Event::Count(3));
    assert_eq!(s.count, 5);
    assert_eq!(s.log, vec!["a"]);
}

#[test]
fn pullback_optional_skips_absent_state() {
    let r = pullback_optional(count, |s: &mut App| s.detail.as_mut(), count_event);
    let mut s = App::default();
    r(&mut s, &Event::Detail(1));
    assert_eq!(s.detail, None);
    s.detail = Some(10);
    r(&mut s, &Event::Detail(1));
    r(&mut s, &Event::Log("x".into()));
    assert_eq!(s.detail, Some(11));
}
