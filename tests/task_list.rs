use assert_call::{call, CallRecorder};
use sigstate::{
    core::Runtime,
    effect,
    records::{RecordList, StatusFilter, TaskRecord},
    spawn_action, Signal, State,
};

#[test]
fn filtered_view_follows_edits() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let tasks = RecordList::<TaskRecord>::new();
    let filter = State::new(StatusFilter::All);

    let view = {
        let tasks = tasks.records();
        let filter = filter.clone();
        Signal::new_dedup(move |sc| {
            let filter = filter.get(sc);
            tasks
                .borrow(sc)
                .iter()
                .filter(|t| filter.matches(t))
                .map(|t| t.title.clone())
                .collect::<Vec<_>>()
        })
    };
    let _e = effect(move |sc| call!("{:?}", view.get(sc)));
    rt.update();
    cr.verify("[]");

    tasks.add_task("buy milk", rt.ac()).unwrap();
    tasks.add_task("walk dog", rt.ac()).unwrap();
    rt.update();
    cr.verify(r#"["buy milk", "walk dog"]"#);

    filter.set(StatusFilter::Done, rt.ac());
    rt.update();
    cr.verify("[]");

    tasks.toggle(2, rt.ac()).unwrap();
    rt.update();
    cr.verify(r#"["walk dog"]"#);

    tasks.modify(1, |t| t.title = "buy oat milk".into(), rt.ac()).unwrap();
    rt.update();
    cr.verify(()); // the done view did not change

    filter.set(StatusFilter::Pending, rt.ac());
    rt.update();
    cr.verify(r#"["buy oat milk"]"#);
}

#[test]
fn edits_from_actions() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let tasks = RecordList::<TaskRecord>::new();
    let remaining = tasks.remaining();
    let _e = effect(move |sc| call!("{}", remaining.get(sc)));
    rt.update();
    cr.verify("0");

    let t = tasks.clone();
    spawn_action(move |ac| {
        t.add_task("a", ac).unwrap();
        t.add_task("b", ac).unwrap();
        t.toggle(1, ac).unwrap();
    });
    rt.update();
    cr.verify("1");
    assert_eq!(tasks.len(&mut rt.sc()), 2);
}
