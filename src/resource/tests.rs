use std::{cell::RefCell, rc::Rc};

use assert_call::{call, CallRecorder};
use futures::channel::oneshot;

use crate::{core::Runtime, effect, Resource, ResourceStatus, State, Subscription};

type Reply = Result<String, String>;

#[derive(Default, Clone)]
struct Fetcher(Rc<RefCell<Vec<(u32, oneshot::Sender<Reply>)>>>);

impl Fetcher {
    fn resource(&self, id: &State<u32>) -> Resource<String, String> {
        let id = id.clone();
        let this = self.clone();
        Resource::new(
            move |sc| id.get(sc),
            move |id| {
                let (tx, rx) = oneshot::channel();
                this.0.borrow_mut().push((id, tx));
                async move { rx.await.unwrap_or_else(|_| Err("canceled".to_string())) }
            },
        )
    }
    fn requests(&self) -> Vec<u32> {
        self.0.borrow().iter().map(|(id, _)| *id).collect()
    }
    fn reply(&self, id: u32, reply: Reply) {
        let index = self
            .0
            .borrow()
            .iter()
            .position(|(i, _)| *i == id)
            .expect("no request");
        let (_, tx) = self.0.borrow_mut().remove(index);
        tx.send(reply).expect("request canceled");
    }
}

fn watch(res: &Resource<String, String>) -> Subscription {
    let res = res.clone();
    effect(move |sc| {
        let s = res.borrow(sc);
        call!("{} {:?} {:?}", s.status, s.value, s.error);
    })
}

#[test]
fn lazy_until_read() {
    let mut rt = Runtime::new();
    let fetcher = Fetcher::default();
    let id = State::new(1);
    let res = fetcher.resource(&id);
    rt.update();
    assert!(fetcher.requests().is_empty());

    assert_eq!(res.status(&mut rt.sc()), ResourceStatus::Pending);
    assert_eq!(fetcher.requests(), vec![1]);
}

#[test]
fn pending_then_ready() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let fetcher = Fetcher::default();
    let id = State::new(1);
    let res = fetcher.resource(&id);
    let _e = watch(&res);
    rt.update();
    cr.verify("pending None None");

    fetcher.reply(1, Ok("one".to_string()));
    rt.update();
    cr.verify(r#"ready Some("one") None"#);
    assert_eq!(res.value(&mut rt.sc()), Some("one".to_string()));
}

#[test]
fn refetch_keeps_previous_value() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let fetcher = Fetcher::default();
    let id = State::new(1);
    let res = fetcher.resource(&id);
    let _e = watch(&res);
    rt.update();
    fetcher.reply(1, Ok("one".to_string()));
    rt.update();
    cr.verify(["pending None None", r#"ready Some("one") None"#]);

    id.set(2, rt.ac());
    rt.update();
    cr.verify(r#"pending Some("one") None"#);

    fetcher.reply(2, Ok("two".to_string()));
    rt.update();
    cr.verify(r#"ready Some("two") None"#);
}

#[test]
fn error_keeps_previous_value() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let fetcher = Fetcher::default();
    let id = State::new(1);
    let res = fetcher.resource(&id);
    let _e = watch(&res);
    rt.update();
    fetcher.reply(1, Ok("one".to_string()));
    rt.update();
    cr.verify(["pending None None", r#"ready Some("one") None"#]);

    id.set(2, rt.ac());
    rt.update();
    fetcher.reply(2, Err("boom".to_string()));
    rt.update();
    cr.verify([
        r#"pending Some("one") None"#,
        r#"error Some("one") Some("boom")"#,
    ]);

    id.set(3, rt.ac());
    rt.update();
    fetcher.reply(3, Ok("three".to_string()));
    rt.update();
    cr.verify([
        r#"pending Some("one") Some("boom")"#,
        r#"ready Some("three") None"#,
    ]);
}

#[test]
fn latest_input_wins() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let fetcher = Fetcher::default();
    let id = State::new(1);
    let res = fetcher.resource(&id);
    let _e = watch(&res);
    rt.update();
    cr.verify("pending None None");

    id.set(2, rt.ac());
    rt.update();
    assert_eq!(fetcher.requests(), vec![1, 2]);

    let (_, stale) = fetcher.0.borrow_mut().remove(0);
    assert!(stale.is_canceled());
    assert!(stale.send(Ok("one".to_string())).is_err());

    fetcher.reply(2, Ok("two".to_string()));
    rt.update();
    cr.verify(r#"ready Some("two") None"#);
}

#[test]
fn reload() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let fetcher = Fetcher::default();
    let id = State::new(7);
    let res = fetcher.resource(&id);
    let _e = watch(&res);
    rt.update();
    fetcher.reply(7, Ok("seven".to_string()));
    rt.update();
    cr.verify(["pending None None", r#"ready Some("seven") None"#]);

    res.reload(rt.ac());
    rt.update();
    cr.verify(r#"pending Some("seven") None"#);
    assert_eq!(fetcher.requests(), vec![7]);

    fetcher.reply(7, Ok("seven again".to_string()));
    rt.update();
    cr.verify(r#"ready Some("seven again") None"#);
}

#[test]
fn immediately_ready_future() {
    let mut rt = Runtime::new();
    let s = State::new(1);
    let s0 = s.clone();
    let res = Resource::new(move |sc| s0.get(sc), |x| async move { Ok::<_, ()>(x * 2) });
    assert_eq!(res.value(&mut rt.sc()), Some(2));
    assert!(res.borrow(&mut rt.sc()).is_ready());

    s.set(5, rt.ac());
    assert_eq!(res.value(&mut rt.sc()), Some(10));
}
