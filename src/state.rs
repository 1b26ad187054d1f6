use std::{
    any::Any,
    cell::{RefCell, RefMut},
    fmt,
    ops::{Deref, DerefMut},
    rc::{Rc, Weak},
};

use derive_ex::derive_ex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    core::{
        schedule_notify, BindKey, BindSink, BindSource, DirtyOrMaybeDirty, NotifyContext,
        SinkBindings, Slot, UpdateContext,
    },
    signal::SignalNode,
    ActionContext, Signal, SignalContext, StateRef,
};

#[cfg(test)]
mod tests;

/// Reactive value cell.
///
/// Reading through a [`SignalContext`] records a dependency on the cell.
/// Writing through an [`ActionContext`] marks every dependent stale at once;
/// they are recomputed when next read, or on the next [`Runtime::update`](crate::core::Runtime::update) for effects.
///
/// Clones share the same value.
#[derive_ex(Clone, bound())]
pub struct State<T: 'static>(Rc<StateNode<T>>);

impl<T: 'static> State<T> {
    pub fn new(value: T) -> Self {
        Self(Rc::new(StateNode {
            sinks: RefCell::new(SinkBindings::new()),
            value: RefCell::new(value),
        }))
    }

    pub fn borrow<'a>(&'a self, sc: &mut SignalContext) -> StateRef<'a, T> {
        self.0.bind(sc);
        self.0.value.borrow().into()
    }
    pub fn get(&self, sc: &mut SignalContext) -> T
    where
        T: Clone,
    {
        self.borrow(sc).clone()
    }

    /// Replaces the value and notifies the dependents, even if the value is equal.
    pub fn set(&self, value: T, ac: &mut ActionContext) {
        *self.0.value.borrow_mut() = value;
        self.0.notify_raw(ac.nc());
    }

    /// Replaces the value and notifies the dependents only if it is different.
    pub fn set_dedup(&self, value: T, ac: &mut ActionContext)
    where
        T: PartialEq,
    {
        let changed = {
            let mut current = self.0.value.borrow_mut();
            *current != value && {
                *current = value;
                true
            }
        };
        if changed {
            self.0.notify_raw(ac.nc());
        }
    }

    /// Modifies the value in place and notifies the dependents.
    pub fn update<U>(&self, f: impl FnOnce(&mut T) -> U, ac: &mut ActionContext) -> U {
        let ret = f(&mut self.0.value.borrow_mut());
        self.0.notify_raw(ac.nc());
        ret
    }

    /// Mutably borrows the value.
    ///
    /// Dependents are notified when the guard is dropped, if it was dereferenced mutably.
    /// Holding the guard keeps `ac` borrowed; see [`borrow_mut_loose`](Self::borrow_mut_loose)
    /// to borrow several states at once.
    pub fn borrow_mut<'a>(&'a self, ac: &'a mut ActionContext) -> StateRefMut<'a, T> {
        self.0.guard(Some(ac.nc()), None)
    }

    /// Mutably borrows the value without holding on to `ac`.
    ///
    /// The notification is queued and delivered before the next read.
    pub fn borrow_mut_loose(&self, _ac: &mut ActionContext) -> StateRefMut<'_, T> {
        self.0.guard(None, None)
    }

    /// Like [`borrow_mut`](Self::borrow_mut), but notifies only if the value differs when the guard is dropped.
    pub fn borrow_mut_dedup<'a>(&'a self, ac: &'a mut ActionContext) -> StateRefMut<'a, T>
    where
        T: PartialEq + Clone,
    {
        let old = self.0.value.borrow().clone();
        let eq: fn(&T, &T) -> bool = <T as PartialEq>::eq;
        self.0.guard(Some(ac.nc()), Some((old, eq)))
    }

    pub fn to_signal(&self) -> Signal<T> {
        Signal::from_node(self.0.clone())
    }
}

impl<T: Default + 'static> Default for State<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
impl<T: fmt::Debug> fmt::Debug for State<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.value.try_borrow() {
            Ok(value) => fmt::Debug::fmt(&*value, f),
            Err(_) => f.write_str("<borrowed>"),
        }
    }
}
impl<T: Serialize> Serialize for State<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let value = self
            .0
            .value
            .try_borrow()
            .map_err(|_| <S::Error as serde::ser::Error>::custom("state is mutably borrowed"))?;
        value.serialize(serializer)
    }
}
impl<'de, T: Deserialize<'de>> Deserialize<'de> for State<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize(deserializer).map(State::new)
    }
}

struct StateNode<T: 'static> {
    sinks: RefCell<SinkBindings>,
    value: RefCell<T>,
}

impl<T: 'static> StateNode<T> {
    fn bind(self: &Rc<Self>, sc: &mut SignalContext) {
        self.sinks.borrow_mut().bind(self.clone(), Slot(0), sc);
    }
    fn notify_raw(&self, nc: &mut NotifyContext) {
        self.sinks
            .borrow_mut()
            .notify(DirtyOrMaybeDirty::Dirty, nc)
    }
    fn guard<'a>(
        self: &'a Rc<Self>,
        nc: Option<&'a mut NotifyContext>,
        dedup: Option<(T, fn(&T, &T) -> bool)>,
    ) -> StateRefMut<'a, T> {
        StateRefMut {
            value: self.value.borrow_mut(),
            node: self,
            nc,
            dedup,
            modified: false,
        }
    }
}

impl<T: 'static> BindSource for StateNode<T> {
    fn check(self: Rc<Self>, _slot: Slot, key: BindKey, uc: &mut UpdateContext) -> bool {
        self.sinks.borrow().is_dirty(key, uc)
    }
    fn unbind(self: Rc<Self>, _slot: Slot, key: BindKey, uc: &mut UpdateContext) {
        self.sinks.borrow_mut().unbind(key, uc);
    }
}
impl<T: 'static> BindSink for StateNode<T> {
    fn notify(self: Rc<Self>, _slot: Slot, _dirty: DirtyOrMaybeDirty, nc: &mut NotifyContext) {
        self.notify_raw(nc);
    }
}
impl<T: 'static> SignalNode for StateNode<T> {
    type Value = T;
    fn borrow<'a>(&'a self, rc_self: Rc<dyn Any>, sc: &mut SignalContext) -> StateRef<'a, T> {
        if let Ok(this) = rc_self.downcast::<Self>() {
            this.bind(sc);
        }
        self.value.borrow().into()
    }
}

/// Write guard returned by [`State::borrow_mut`] and its variants.
pub struct StateRefMut<'a, T: 'static> {
    value: RefMut<'a, T>,
    node: &'a Rc<StateNode<T>>,
    nc: Option<&'a mut NotifyContext>,
    dedup: Option<(T, fn(&T, &T) -> bool)>,
    modified: bool,
}

impl<T: 'static> Deref for StateRefMut<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.value
    }
}
impl<T: 'static> DerefMut for StateRefMut<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.modified = true;
        &mut self.value
    }
}
impl<T: 'static> Drop for StateRefMut<'_, T> {
    fn drop(&mut self) {
        if !self.modified {
            return;
        }
        if let Some((old, eq)) = &self.dedup {
            if eq(old, &*self.value) {
                return;
            }
        }
        match self.nc.take() {
            Some(nc) => self.node.notify_raw(nc),
            None => {
                let node: Weak<StateNode<T>> = Rc::downgrade(self.node);
                schedule_notify(node, Slot(0));
            }
        }
    }
}
