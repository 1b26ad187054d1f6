use std::{collections::HashSet, rc::Rc};

use derive_ex::derive_ex;
use parse_display::{Display, FromStr};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    error::{PersistError, RecordError},
    persist::{persist, restore, PersistConfig, Persistence},
    storage::KeyValueStore,
    ActionContext, Signal, SignalContext, State,
};

#[cfg(test)]
mod tests;

pub type RecordId = u64;

/// An element of a [`RecordList`], identified by a unique id.
pub trait Record: Clone + 'static {
    fn id(&self) -> RecordId;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: RecordId,
    pub title: String,
    pub done: bool,
}
impl TaskRecord {
    pub fn new(id: RecordId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            done: false,
        }
    }
}
impl Record for TaskRecord {
    fn id(&self) -> RecordId {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: RecordId,
    pub name: String,
    pub price: f64,
    #[serde(default = "default_in_stock")]
    pub in_stock: bool,
}
fn default_in_stock() -> bool {
    true
}
impl Product {
    pub fn new(id: RecordId, name: impl Into<String>, price: f64) -> Self {
        Self {
            id,
            name: name.into(),
            price,
            in_stock: true,
        }
    }
}
impl Record for Product {
    fn id(&self) -> RecordId {
        self.id
    }
}

/// Partition of tasks by completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, FromStr)]
#[display(style = "snake_case")]
pub enum StatusFilter {
    #[default]
    All,
    Pending,
    Done,
}
impl StatusFilter {
    pub fn matches(self, task: &TaskRecord) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Pending => !task.done,
            StatusFilter::Done => task.done,
        }
    }
}

/// Returns the tasks matching `filter`, in their original order.
pub fn filter_by_status(tasks: &[TaskRecord], filter: StatusFilter) -> Vec<TaskRecord> {
    tasks.iter().filter(|t| filter.matches(t)).cloned().collect()
}

/// Ordered sequence of records with unique ids.
///
/// Reads record a dependency on the whole sequence; every successful mutation notifies it.
#[derive_ex(Clone, bound())]
pub struct RecordList<R: Record> {
    records: State<Vec<R>>,
}

impl<R: Record> Default for RecordList<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> RecordList<R> {
    pub fn new() -> Self {
        Self {
            records: State::new(Vec::new()),
        }
    }

    /// Creates a list from `records`, rejecting duplicate ids.
    pub fn from_records(records: Vec<R>) -> Result<Self, RecordError> {
        check_unique(&records)?;
        Ok(Self {
            records: State::new(records),
        })
    }

    pub fn records(&self) -> Signal<Vec<R>> {
        self.records.to_signal()
    }
    pub fn to_vec(&self, sc: &mut SignalContext) -> Vec<R> {
        self.records.get(sc)
    }
    pub fn get(&self, id: RecordId, sc: &mut SignalContext) -> Option<R> {
        self.records.borrow(sc).iter().find(|r| r.id() == id).cloned()
    }
    pub fn len(&self, sc: &mut SignalContext) -> usize {
        self.records.borrow(sc).len()
    }
    pub fn is_empty(&self, sc: &mut SignalContext) -> bool {
        self.records.borrow(sc).is_empty()
    }

    /// Appends `record`.
    pub fn insert(&self, record: R, ac: &mut ActionContext) -> Result<(), RecordError> {
        let id = record.id();
        if self.records.borrow(&mut ac.sc()).iter().any(|r| r.id() == id) {
            return Err(RecordError::DuplicateId(id));
        }
        self.records.update(|records| records.push(record), ac);
        Ok(())
    }

    /// Appends the record built by `f` from a fresh id, one above the largest id in use.
    ///
    /// Fails with [`RecordError::IdExhausted`] once the largest id is `RecordId::MAX`.
    pub fn push_with(
        &self,
        f: impl FnOnce(RecordId) -> R,
        ac: &mut ActionContext,
    ) -> Result<RecordId, RecordError> {
        let last = self.records.borrow(&mut ac.sc()).iter().map(|r| r.id()).max();
        let id = match last {
            None => 1,
            Some(last) => last.checked_add(1).ok_or(RecordError::IdExhausted(last))?,
        };
        let record = f(id);
        if record.id() != id {
            return Err(RecordError::IdChanged {
                from: id,
                to: record.id(),
            });
        }
        self.records.update(|records| records.push(record), ac);
        Ok(id)
    }

    /// Removes the record with `id`, keeping the order of the others.
    pub fn remove(&self, id: RecordId, ac: &mut ActionContext) -> Result<R, RecordError> {
        let index = self.position(id, ac)?;
        Ok(self.records.update(|records| records.remove(index), ac))
    }

    /// Modifies the record with `id`.
    ///
    /// `f` works on a copy. If it changes the id, the list is left untouched
    /// and [`RecordError::IdChanged`] is returned.
    pub fn modify<U>(
        &self,
        id: RecordId,
        f: impl FnOnce(&mut R) -> U,
        ac: &mut ActionContext,
    ) -> Result<U, RecordError> {
        let index = self.position(id, ac)?;
        let mut record = self.records.borrow(&mut ac.sc())[index].clone();
        let ret = f(&mut record);
        if record.id() != id {
            return Err(RecordError::IdChanged {
                from: id,
                to: record.id(),
            });
        }
        self.records.update(|records| records[index] = record, ac);
        Ok(ret)
    }

    /// Replaces the whole sequence, rejecting duplicate ids.
    pub fn replace_all(&self, records: Vec<R>, ac: &mut ActionContext) -> Result<(), RecordError> {
        check_unique(&records)?;
        self.records.set(records, ac);
        Ok(())
    }

    /// Returns a cached signal of the records matching `pred`.
    ///
    /// Dependents are only notified when the filtered sequence actually changes.
    pub fn filtered(&self, pred: impl Fn(&R) -> bool + 'static) -> Signal<Vec<R>>
    where
        R: PartialEq,
    {
        let records = self.records.clone();
        Signal::new_dedup(move |sc| {
            records
                .borrow(sc)
                .iter()
                .filter(|r| pred(r))
                .cloned()
                .collect()
        })
    }

    fn position(&self, id: RecordId, ac: &mut ActionContext) -> Result<usize, RecordError> {
        self.records
            .borrow(&mut ac.sc())
            .iter()
            .position(|r| r.id() == id)
            .ok_or(RecordError::NotFound(id))
    }
}

fn check_unique<R: Record>(records: &[R]) -> Result<(), RecordError> {
    let mut ids = HashSet::new();
    for r in records {
        if !ids.insert(r.id()) {
            return Err(RecordError::DuplicateId(r.id()));
        }
    }
    Ok(())
}

impl<R: Record + Serialize + DeserializeOwned> RecordList<R> {
    /// Loads a list from `store`; a missing key yields an empty list.
    pub fn restore(
        store: &dyn KeyValueStore,
        config: &PersistConfig,
    ) -> Result<Self, PersistError> {
        let records: Option<Vec<R>> = restore(store, &config.key)?;
        Ok(Self::from_records(records.unwrap_or_default())?)
    }

    /// Mirrors the list into `store` each time it changes.
    pub fn persist(&self, store: Rc<dyn KeyValueStore>, config: &PersistConfig) -> Persistence {
        persist(self.records(), store, config)
    }
}

impl RecordList<TaskRecord> {
    pub fn add_task(
        &self,
        title: impl Into<String>,
        ac: &mut ActionContext,
    ) -> Result<RecordId, RecordError> {
        let title = title.into();
        self.push_with(|id| TaskRecord::new(id, title), ac)
    }

    /// Flips `done` and returns the new value.
    pub fn toggle(&self, id: RecordId, ac: &mut ActionContext) -> Result<bool, RecordError> {
        self.modify(
            id,
            |task| {
                task.done = !task.done;
                task.done
            },
            ac,
        )
    }

    pub fn by_status(&self, filter: StatusFilter) -> Signal<Vec<TaskRecord>> {
        self.filtered(move |task| filter.matches(task))
    }

    /// Number of tasks not done yet.
    pub fn remaining(&self) -> Signal<usize> {
        let records = self.records.clone();
        Signal::new_dedup(move |sc| records.borrow(sc).iter().filter(|t| !t.done).count())
    }
}

impl RecordList<Product> {
    pub fn total_price(&self) -> Signal<f64> {
        let records = self.records.clone();
        Signal::new_dedup(move |sc| records.borrow(sc).iter().map(|p| p.price).sum())
    }
    pub fn in_stock(&self) -> Signal<Vec<Product>> {
        self.filtered(|p| p.in_stock)
    }
}
