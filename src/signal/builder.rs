use std::{
    any::Any,
    cell::{Cell, Ref, RefCell},
    marker::PhantomData,
    rc::Rc,
};

use crate::{
    core::{
        BindKey, BindSink, BindSource, DirtyOrMaybeDirty, NotifyContext, SinkBindings, Slot,
        SourceBinder, Task, UpdateContext,
    },
    Signal, SignalContext, StateRef,
};

use super::SignalNode;

/// Builder for a derived [`Signal`].
///
/// ```
/// use sigstate::{core::Runtime, Signal, SignalBuilder, State};
///
/// let mut rt = Runtime::new();
/// let price = State::new(10);
/// let p = price.clone();
/// let total = SignalBuilder::new(move |sc| p.get(sc) * 3).dedup().keep().build();
/// assert_eq!(total.get(&mut rt.sc()), 30);
/// ```
pub struct SignalBuilder<T, F> {
    f: F,
    eq: Option<fn(&T, &T) -> bool>,
    keep: bool,
    _value: PhantomData<fn() -> T>,
}

impl<T, F> SignalBuilder<T, F>
where
    T: 'static,
    F: FnMut(&mut SignalContext) -> T + 'static,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            eq: None,
            keep: false,
            _value: PhantomData,
        }
    }

    /// Do not notify dependents when the recomputed value equals the cached one.
    pub fn dedup(self) -> Self
    where
        T: PartialEq,
    {
        let eq: fn(&T, &T) -> bool = <T as PartialEq>::eq;
        Self {
            eq: Some(eq),
            ..self
        }
    }

    /// Keep the cached value even while nothing depends on the signal.
    ///
    /// By default the cache is dropped in [`Runtime::run_discards`](crate::core::Runtime::run_discards)
    /// once the last dependent goes away, and recomputed on the next read.
    pub fn keep(self) -> Self {
        Self { keep: true, ..self }
    }

    pub fn build(self) -> Signal<T> {
        Signal::from_node(Rc::new_cyclic(|this| ComputedNode {
            sinks: RefCell::new(SinkBindings::new()),
            data: RefCell::new(ComputedData {
                f: self.f,
                value: None,
                sb: SourceBinder::new(this, Slot(0)),
            }),
            eq: self.eq,
            keep: self.keep,
            discard_scheduled: Cell::new(false),
        }))
    }
}

struct ComputedData<T, F> {
    f: F,
    value: Option<T>,
    sb: SourceBinder,
}

struct ComputedNode<T, F> {
    sinks: RefCell<SinkBindings>,
    data: RefCell<ComputedData<T, F>>,
    eq: Option<fn(&T, &T) -> bool>,
    keep: bool,
    discard_scheduled: Cell<bool>,
}

impl<T, F> ComputedNode<T, F>
where
    T: 'static,
    F: FnMut(&mut SignalContext) -> T + 'static,
{
    fn update(self: &Rc<Self>, uc: &mut UpdateContext) {
        if uc.borrow(&self.data).sb.is_clean() {
            return;
        }
        let is_dirty = {
            let d = &mut *self.data.borrow_mut();
            if d.sb.check(uc) || d.value.is_none() {
                let value = d.sb.update(|sc| (d.f)(sc), uc);
                let is_same = match (&d.value, self.eq) {
                    (Some(old), Some(eq)) => eq(old, &value),
                    _ => false,
                };
                if !is_same {
                    d.value = Some(value);
                }
                !is_same
            } else {
                false
            }
        };
        self.sinks.borrow_mut().update(is_dirty, uc);
    }

    fn try_schedule_discard(self: &Rc<Self>, uc: &mut UpdateContext) {
        if self.keep || self.discard_scheduled.get() || !self.sinks.borrow().is_empty() {
            return;
        }
        self.discard_scheduled.set(true);
        uc.schedule_discard(Task::from_weak_fn(Rc::downgrade(self), |this, uc| {
            this.discard(uc)
        }));
    }
    fn discard(&self, uc: &mut UpdateContext) {
        self.discard_scheduled.set(false);
        if self.sinks.borrow().is_empty() {
            let mut d = self.data.borrow_mut();
            d.value = None;
            d.sb.clear(uc);
        }
    }
}

impl<T, F> SignalNode for ComputedNode<T, F>
where
    T: 'static,
    F: FnMut(&mut SignalContext) -> T + 'static,
{
    type Value = T;

    fn borrow<'a>(&'a self, rc_self: Rc<dyn Any>, sc: &mut SignalContext) -> StateRef<'a, T> {
        let this = rc_self.downcast::<Self>().unwrap();
        self.sinks.borrow_mut().bind(this.clone(), Slot(0), sc);
        this.update(sc.uc());
        this.try_schedule_discard(sc.uc());
        Ref::map(self.data.borrow(), |d| d.value.as_ref().unwrap()).into()
    }
}
impl<T, F> BindSource for ComputedNode<T, F>
where
    T: 'static,
    F: FnMut(&mut SignalContext) -> T + 'static,
{
    fn check(self: Rc<Self>, _slot: Slot, key: BindKey, uc: &mut UpdateContext) -> bool {
        self.update(uc);
        self.sinks.borrow().is_dirty(key, uc)
    }
    fn unbind(self: Rc<Self>, _slot: Slot, key: BindKey, uc: &mut UpdateContext) {
        self.sinks.borrow_mut().unbind(key, uc);
        self.try_schedule_discard(uc);
    }
}
impl<T, F> BindSink for ComputedNode<T, F>
where
    T: 'static,
    F: FnMut(&mut SignalContext) -> T + 'static,
{
    fn notify(self: Rc<Self>, slot: Slot, dirty: DirtyOrMaybeDirty, nc: &mut NotifyContext) {
        if self.data.borrow_mut().sb.on_notify(slot, dirty) {
            self.sinks
                .borrow_mut()
                .notify(dirty.with_filter(self.eq.is_some()), nc)
        }
    }
}
