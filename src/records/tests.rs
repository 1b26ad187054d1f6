use std::rc::Rc;

use assert_call::{call, CallRecorder};
use rstest::rstest;

use crate::{
    core::Runtime,
    effect,
    error::{PersistError, RecordError},
    persist::PersistConfig,
    storage::{KeyValueStore, MemoryStore},
};

use super::{filter_by_status, Product, RecordList, StatusFilter, TaskRecord};

fn task(id: u64, done: bool) -> TaskRecord {
    TaskRecord {
        id,
        title: format!("task {id}"),
        done,
    }
}

fn ids(tasks: &[TaskRecord]) -> Vec<u64> {
    tasks.iter().map(|t| t.id).collect()
}

#[test]
fn toggle_moves_task_between_filters() {
    let mut rt = Runtime::new();
    let list = RecordList::from_records(vec![task(1, false), task(2, true)]).unwrap();
    let pending = list.by_status(StatusFilter::Pending);
    assert_eq!(ids(&pending.get(&mut rt.sc())), vec![1]);

    assert_eq!(list.toggle(1, rt.ac()), Ok(true));
    assert_eq!(ids(&pending.get(&mut rt.sc())), Vec::<u64>::new());
    assert_eq!(
        ids(&list.by_status(StatusFilter::Done).get(&mut rt.sc())),
        vec![1, 2]
    );
}

#[rstest]
#[case(StatusFilter::All, vec![1, 2, 3, 4])]
#[case(StatusFilter::Pending, vec![1, 3])]
#[case(StatusFilter::Done, vec![2, 4])]
fn filter_is_ordered_and_idempotent(#[case] filter: StatusFilter, #[case] expected: Vec<u64>) {
    let tasks = vec![task(1, false), task(2, true), task(3, false), task(4, true)];
    let once = filter_by_status(&tasks, filter);
    assert_eq!(ids(&once), expected);
    assert_eq!(filter_by_status(&once, filter), once);
}

#[rstest]
#[case("all", StatusFilter::All)]
#[case("pending", StatusFilter::Pending)]
#[case("done", StatusFilter::Done)]
fn status_filter_text(#[case] text: &str, #[case] filter: StatusFilter) {
    assert_eq!(text.parse::<StatusFilter>().unwrap(), filter);
    assert_eq!(filter.to_string(), text);
}

#[test]
fn insert_then_remove_restores_sequence() {
    let mut rt = Runtime::new();
    let list = RecordList::from_records(vec![task(1, false), task(2, true)]).unwrap();
    let before = list.to_vec(&mut rt.sc());

    list.insert(task(9, false), rt.ac()).unwrap();
    assert_eq!(ids(&list.to_vec(&mut rt.sc())), vec![1, 2, 9]);
    assert_eq!(list.remove(9, rt.ac()), Ok(task(9, false)));
    assert_eq!(list.to_vec(&mut rt.sc()), before);
}

#[test]
fn remove_keeps_order() {
    let mut rt = Runtime::new();
    let list =
        RecordList::from_records(vec![task(1, false), task(2, false), task(3, false)]).unwrap();
    list.remove(2, rt.ac()).unwrap();
    assert_eq!(ids(&list.to_vec(&mut rt.sc())), vec![1, 3]);
}

#[test]
fn id_errors() {
    let mut rt = Runtime::new();
    let list = RecordList::from_records(vec![task(1, false)]).unwrap();
    assert_eq!(
        list.insert(task(1, true), rt.ac()),
        Err(RecordError::DuplicateId(1))
    );
    assert_eq!(list.remove(5, rt.ac()), Err(RecordError::NotFound(5)));
    assert_eq!(list.toggle(5, rt.ac()), Err(RecordError::NotFound(5)));
    assert_eq!(list.len(&mut rt.sc()), 1);
    assert_eq!(
        list.replace_all(vec![task(3, false), task(3, true)], rt.ac()),
        Err(RecordError::DuplicateId(3))
    );
    assert_eq!(list.get(1, &mut rt.sc()), Some(task(1, false)));

    assert!(matches!(
        RecordList::from_records(vec![task(2, false), task(2, false)]),
        Err(RecordError::DuplicateId(2))
    ));
}

#[test]
fn add_task_assigns_next_id() {
    let mut rt = Runtime::new();
    let list = RecordList::<TaskRecord>::new();
    assert!(list.is_empty(&mut rt.sc()));
    assert_eq!(list.add_task("first", rt.ac()), Ok(1));
    assert_eq!(list.add_task("second", rt.ac()), Ok(2));
    list.remove(1, rt.ac()).unwrap();
    assert_eq!(list.add_task("third", rt.ac()), Ok(3));
    assert_eq!(
        list.get(3, &mut rt.sc()),
        Some(TaskRecord::new(3, "third"))
    );
}

#[test]
fn add_task_fails_once_ids_run_out() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let list = RecordList::from_records(vec![task(u64::MAX, false)]).unwrap();
    let records = list.records();
    let _e = effect(move |sc| call!("{}", records.borrow(sc).len()));
    rt.update();
    cr.verify("1");

    assert_eq!(
        list.add_task("next", rt.ac()),
        Err(RecordError::IdExhausted(u64::MAX))
    );
    rt.update();
    cr.verify(());
    assert_eq!(list.len(&mut rt.sc()), 1);
}

#[test]
fn push_with_rejects_record_with_other_id() {
    let mut rt = Runtime::new();
    let list = RecordList::from_records(vec![task(1, false)]).unwrap();
    assert_eq!(
        list.push_with(|_| task(1, true), rt.ac()),
        Err(RecordError::IdChanged { from: 2, to: 1 })
    );
    assert_eq!(list.len(&mut rt.sc()), 1);
}

#[test]
fn modify_cannot_change_id() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let list = RecordList::from_records(vec![task(1, false), task(2, false)]).unwrap();
    let records = list.records();
    let _e = effect(move |sc| {
        let ids: Vec<_> = records.borrow(sc).iter().map(|t| t.id).collect();
        call!("{ids:?}");
    });
    rt.update();
    cr.verify("[1, 2]");

    let r = list.modify(
        2,
        |t| {
            t.id = 1;
            t.done = true;
        },
        rt.ac(),
    );
    assert_eq!(r, Err(RecordError::IdChanged { from: 2, to: 1 }));
    rt.update();
    cr.verify(());
    assert_eq!(list.get(2, &mut rt.sc()), Some(task(2, false)));
    assert_eq!(list.remove(2, rt.ac()).map(|t| t.id), Ok(2));
}

#[test]
fn remaining_notifies_only_on_change() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let list = RecordList::from_records(vec![task(1, false), task(2, true)]).unwrap();
    let remaining = list.remaining();
    let _e = effect(move |sc| call!("remaining {}", remaining.get(sc)));
    rt.update();
    cr.verify("remaining 1");

    list.modify(2, |t| t.title = "renamed".to_string(), rt.ac()).unwrap();
    rt.update();
    cr.verify(());

    list.toggle(2, rt.ac()).unwrap();
    rt.update();
    cr.verify("remaining 2");
}

#[test]
fn products() {
    let mut rt = Runtime::new();
    let list = RecordList::from_records(vec![
        Product::new(1, "pen", 1.5),
        Product::new(2, "ink", 4.0),
    ])
    .unwrap();
    let total = list.total_price();
    let in_stock = list.in_stock();
    assert_eq!(total.get(&mut rt.sc()), 5.5);

    list.modify(2, |p| p.in_stock = false, rt.ac()).unwrap();
    let names: Vec<_> = in_stock
        .get(&mut rt.sc())
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(names, vec!["pen"]);

    let id = list.push_with(|id| Product::new(id, "pad", 2.0), rt.ac());
    assert_eq!(id, Ok(3));
    assert_eq!(total.get(&mut rt.sc()), 7.5);
}

#[test]
fn product_in_stock_defaults_to_true() {
    let p: Product = serde_json::from_str(r#"{"id":1,"name":"pen","price":1.5}"#).unwrap();
    assert!(p.in_stock);
}

#[test]
fn persist_and_restore() {
    let mut rt = Runtime::new();
    let store = MemoryStore::new();
    let config = PersistConfig::new("tasks");

    let list = RecordList::<TaskRecord>::restore(&store, &config).unwrap();
    assert!(list.is_empty(&mut rt.sc()));
    let _p = list.persist(Rc::new(store.clone()), &config);
    list.add_task("write docs", rt.ac()).unwrap();
    list.add_task("ship", rt.ac()).unwrap();
    list.toggle(1, rt.ac()).unwrap();
    rt.update();

    let restored = RecordList::<TaskRecord>::restore(&store, &config).unwrap();
    assert_eq!(restored.to_vec(&mut rt.sc()), list.to_vec(&mut rt.sc()));
}

#[test]
fn restore_rejects_duplicate_ids() {
    let store = MemoryStore::new();
    store
        .set_item(
            "records",
            r#"[{"id":1,"title":"a","done":false},{"id":1,"title":"b","done":true}]"#,
        )
        .unwrap();
    assert!(matches!(
        RecordList::<TaskRecord>::restore(&store, &PersistConfig::default()),
        Err(PersistError::Record(RecordError::DuplicateId(1)))
    ));
}
