use assert_call::{call, CallRecorder};

use crate::{core::Runtime, effect, State};

#[test]
fn get_after_set() {
    let mut rt = Runtime::new();
    let name = State::new(String::from("draft"));
    assert_eq!(name.get(&mut rt.sc()), "draft");

    name.set("final".into(), rt.ac());
    assert_eq!(name.get(&mut rt.sc()), "final");
    assert_eq!(format!("{name:?}"), "\"final\"");
}

#[test]
fn set_reruns_effect_on_next_update() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let total = State::new(3);
    let total0 = total.clone();
    let _e = effect(move |sc| call!("total {}", total0.get(sc)));
    rt.update();
    cr.verify("total 3");

    total.set(4, rt.ac());
    cr.verify(());
    rt.update();
    cr.verify("total 4");
}

#[test]
fn set_notifies_even_if_equal() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let total = State::new(3);
    let total0 = total.clone();
    let _e = effect(move |sc| call!("total {}", total0.get(sc)));
    rt.update();
    cr.verify("total 3");

    total.set(3, rt.ac());
    rt.update();
    cr.verify("total 3");
}

#[test]
fn set_dedup_skips_equal_value() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let total = State::new(3);
    let total0 = total.clone();
    let _e = effect(move |sc| call!("total {}", total0.get(sc)));
    rt.update();
    cr.verify("total 3");

    total.set_dedup(3, rt.ac());
    rt.update();
    cr.verify(());

    total.set_dedup(7, rt.ac());
    rt.update();
    cr.verify("total 7");
}

#[test]
fn borrow_mut_effect() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let s = State::new(vec![1]);
    let s0 = s.clone();
    let _e = effect(move |sc| call!("{:?}", s0.get(sc)));
    rt.update();
    cr.verify("[1]");

    s.borrow_mut(rt.ac()).push(2);
    rt.update();
    cr.verify("[1, 2]");

    let len = s.borrow_mut(rt.ac()).len();
    assert_eq!(len, 2);
    rt.update();
    cr.verify(()); // read only, no notification
}

#[test]
fn borrow_mut_loose_notifies_later() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let a = State::new(1);
    let b = State::new(2);
    let a0 = a.clone();
    let b0 = b.clone();
    let _e = effect(move |sc| call!("{}", a0.get(sc) + b0.get(sc)));
    rt.update();
    cr.verify("3");

    {
        let ac = rt.ac();
        let mut a_mut = a.borrow_mut_loose(ac);
        let mut b_mut = b.borrow_mut_loose(ac);
        *a_mut = 10;
        *b_mut = 20;
    }
    assert_eq!(a.get(&mut rt.sc()), 10);
    rt.update();
    cr.verify("30");
}

#[test]
fn borrow_mut_dedup_effect() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let s = State::new(5);
    let s0 = s.clone();
    let _e = effect(move |sc| call!("{}", s0.get(sc)));
    rt.update();
    cr.verify("5");

    *s.borrow_mut_dedup(rt.ac()) = 5;
    rt.update();
    cr.verify(());

    *s.borrow_mut_dedup(rt.ac()) = 6;
    rt.update();
    cr.verify("6");
}

#[test]
fn update_returns_value() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let s = State::new(vec![1, 2, 3]);
    let s0 = s.clone();
    let _e = effect(move |sc| call!("{}", s0.borrow(sc).len()));
    rt.update();
    cr.verify("3");

    let removed = s.update(|v| v.remove(0), rt.ac());
    assert_eq!(removed, 1);
    rt.update();
    cr.verify("2");
}

#[test]
fn to_signal() {
    let mut rt = Runtime::new();
    let s = State::new("abc".to_string());
    let sig = s.to_signal();
    assert_eq!(sig.get(&mut rt.sc()), "abc");
    s.set("xyz".to_string(), rt.ac());
    assert_eq!(sig.get(&mut rt.sc()), "xyz");
}

#[test]
fn serde() {
    let _rt = Runtime::new();
    let s = State::new(vec![1, 2]);
    assert_eq!(serde_json::to_string(&s).unwrap(), "[1,2]");
    let s: State<Vec<i32>> = serde_json::from_str("[3]").unwrap();
    assert_eq!(format!("{s:?}"), "[3]");
}
