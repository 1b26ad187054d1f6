use std::{
    any::Any,
    cell::{Ref, RefCell},
    future::Future,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll, Waker},
};

use derive_ex::derive_ex;
use log::debug;
use parse_display::Display;

use crate::{
    core::{
        waker_from_sink, BindKey, BindSink, BindSource, DirtyOrMaybeDirty, NotifyContext,
        SinkBindings, Slot, SourceBinder, UpdateContext,
    },
    signal::SignalNode,
    ActionContext, Signal, SignalContext, StateRef,
};

#[cfg(test)]
mod tests;

const SLOT_SOURCE: Slot = Slot(0);
const SLOT_POLL: Slot = Slot(1);

/// Progress of the latest fetch of a [`Resource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display(style = "snake_case")]
pub enum ResourceStatus {
    /// A fetch is in flight.
    Pending,
    /// The latest fetch succeeded.
    Ready,
    /// The latest fetch failed.
    Error,
}

/// Snapshot of a [`Resource`].
///
/// `value` is the most recent successful result. It is kept while a newer fetch is pending or has failed.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceState<T, E> {
    pub status: ResourceStatus,
    pub value: Option<T>,
    pub error: Option<E>,
}
impl<T, E> ResourceState<T, E> {
    fn new() -> Self {
        Self {
            status: ResourceStatus::Pending,
            value: None,
            error: None,
        }
    }
    pub fn is_pending(&self) -> bool {
        self.status == ResourceStatus::Pending
    }
    pub fn is_ready(&self) -> bool {
        self.status == ResourceStatus::Ready
    }
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }
    pub fn error(&self) -> Option<&E> {
        self.error.as_ref()
    }
}

/// A reactive value produced by an asynchronous fetch.
///
/// `source` reads the inputs of the fetch and is tracked like a derived signal.
/// Whenever those inputs change, `fetch` is called again with the new input and the
/// previous in-flight future is dropped.
///
/// Fetching is lazy: nothing runs until the resource is first read.
/// Futures are polled by the runtime, so no executor is needed; completion is delivered
/// through a [`Waker`] that invalidates the resource.
#[derive_ex(Clone, bound())]
pub struct Resource<T: 'static, E: 'static> {
    state: Signal<ResourceState<T, E>>,
    control: Rc<dyn ResourceControl>,
}

impl<T: 'static, E: 'static> Resource<T, E> {
    pub fn new<I, Fut>(
        source: impl FnMut(&mut SignalContext) -> I + 'static,
        mut fetch: impl FnMut(I) -> Fut + 'static,
    ) -> Self
    where
        I: 'static,
        Fut: Future<Output = Result<T, E>> + 'static,
    {
        let node = Rc::new_cyclic(|this| ResourceNode {
            sinks: RefCell::new(SinkBindings::new()),
            data: RefCell::new(ResourceData {
                source,
                fetch: Box::new(move |input| Box::pin(fetch(input)) as BoxFuture<T, E>),
                sb: SourceBinder::new(this, SLOT_SOURCE),
                future: None,
                is_wake: false,
                waker: waker_from_sink(this.clone(), SLOT_POLL),
                state: ResourceState::new(),
            }),
        });
        Self {
            state: Signal::from_node(node.clone()),
            control: node,
        }
    }

    /// Returns the state of the resource as a signal.
    pub fn state(&self) -> Signal<ResourceState<T, E>> {
        self.state.clone()
    }
    pub fn borrow<'a>(&'a self, sc: &mut SignalContext) -> StateRef<'a, ResourceState<T, E>> {
        self.state.borrow(sc)
    }
    pub fn status(&self, sc: &mut SignalContext) -> ResourceStatus {
        self.borrow(sc).status
    }

    /// Returns the latest successfully fetched value.
    pub fn value(&self, sc: &mut SignalContext) -> Option<T>
    where
        T: Clone,
    {
        self.borrow(sc).value.clone()
    }

    /// Fetches again, reading the inputs anew.
    pub fn reload(&self, ac: &mut ActionContext) {
        self.control.clone().reload(ac.nc());
    }
}

type BoxFuture<T, E> = Pin<Box<dyn Future<Output = Result<T, E>>>>;

trait ResourceControl {
    fn reload(self: Rc<Self>, nc: &mut NotifyContext);
}

struct ResourceData<I, T, E, S> {
    source: S,
    fetch: Box<dyn FnMut(I) -> BoxFuture<T, E>>,
    sb: SourceBinder,
    future: Option<BoxFuture<T, E>>,
    is_wake: bool,
    waker: Waker,
    state: ResourceState<T, E>,
}

struct ResourceNode<I, T, E, S> {
    sinks: RefCell<SinkBindings>,
    data: RefCell<ResourceData<I, T, E, S>>,
}

impl<I, T, E, S> ResourceNode<I, T, E, S>
where
    I: 'static,
    T: 'static,
    E: 'static,
    S: FnMut(&mut SignalContext) -> I + 'static,
{
    fn update(self: &Rc<Self>, uc: &mut UpdateContext) {
        let is_dirty = {
            let d = &mut *uc.borrow_mut(&self.data);
            let mut is_dirty = false;
            if d.sb.check(uc) {
                let input = d.sb.update(|sc| (d.source)(sc), uc);
                debug!("resource fetch started");
                d.future = Some((d.fetch)(input));
                d.is_wake = true;
                if d.state.status != ResourceStatus::Pending {
                    d.state.status = ResourceStatus::Pending;
                    is_dirty = true;
                }
            }
            if d.is_wake {
                d.is_wake = false;
                if let Some(future) = &mut d.future {
                    let mut cx = Context::from_waker(&d.waker);
                    if let Poll::Ready(result) = future.as_mut().poll(&mut cx) {
                        d.future = None;
                        match result {
                            Ok(value) => {
                                d.state.status = ResourceStatus::Ready;
                                d.state.value = Some(value);
                                d.state.error = None;
                            }
                            Err(e) => {
                                d.state.status = ResourceStatus::Error;
                                d.state.error = Some(e);
                            }
                        }
                        is_dirty = true;
                    }
                }
            }
            is_dirty
        };
        self.sinks.borrow_mut().update(is_dirty, uc);
    }
}

impl<I, T, E, S> SignalNode for ResourceNode<I, T, E, S>
where
    I: 'static,
    T: 'static,
    E: 'static,
    S: FnMut(&mut SignalContext) -> I + 'static,
{
    type Value = ResourceState<T, E>;

    fn borrow<'a>(
        &'a self,
        rc_self: Rc<dyn Any>,
        sc: &mut SignalContext,
    ) -> StateRef<'a, Self::Value> {
        if let Ok(this) = rc_self.downcast::<Self>() {
            self.sinks.borrow_mut().bind(this.clone(), SLOT_SOURCE, sc);
            this.update(sc.uc());
        }
        Ref::map(self.data.borrow(), |d| &d.state).into()
    }
}
impl<I, T, E, S> BindSource for ResourceNode<I, T, E, S>
where
    I: 'static,
    T: 'static,
    E: 'static,
    S: FnMut(&mut SignalContext) -> I + 'static,
{
    fn check(self: Rc<Self>, _slot: Slot, key: BindKey, uc: &mut UpdateContext) -> bool {
        self.update(uc);
        self.sinks.borrow().is_dirty(key, uc)
    }
    fn unbind(self: Rc<Self>, _slot: Slot, key: BindKey, uc: &mut UpdateContext) {
        self.sinks.borrow_mut().unbind(key, uc);
    }
}
impl<I, T, E, S> BindSink for ResourceNode<I, T, E, S>
where
    I: 'static,
    T: 'static,
    E: 'static,
    S: FnMut(&mut SignalContext) -> I + 'static,
{
    fn notify(self: Rc<Self>, slot: Slot, dirty: DirtyOrMaybeDirty, nc: &mut NotifyContext) {
        let need_notify = {
            let mut d = self.data.borrow_mut();
            if slot == SLOT_POLL {
                if d.future.is_none() || d.is_wake {
                    false
                } else {
                    d.is_wake = true;
                    true
                }
            } else {
                d.sb.on_notify(slot, dirty)
            }
        };
        if need_notify {
            self.sinks
                .borrow_mut()
                .notify(DirtyOrMaybeDirty::MaybeDirty, nc);
        }
    }
}
impl<I, T, E, S> ResourceControl for ResourceNode<I, T, E, S>
where
    I: 'static,
    T: 'static,
    E: 'static,
    S: FnMut(&mut SignalContext) -> I + 'static,
{
    fn reload(self: Rc<Self>, nc: &mut NotifyContext) {
        self.notify(SLOT_SOURCE, DirtyOrMaybeDirty::Dirty, nc);
    }
}
