//! Runtime and dependency graph shared by every reactive node.
//!
//! Writes mark dependents as `Dirty` or `MaybeDirty` right away (push),
//! while values are only recomputed when they are read (pull).

use std::{
    cell::{Ref, RefCell, RefMut},
    collections::BTreeMap,
    future::poll_fn,
    mem::{take, transmute},
    rc::{Rc, Weak},
    task::{Context, Poll, Waker},
    thread::AccessError,
};

use derive_ex::Ex;
use log::trace;
use parse_display::Display;

mod bindings;
mod dirty;
mod state_ref;
mod wake;

pub use bindings::{BindKey, SinkBindings, Slot, SourceBinder, SourceBindings};
pub use dirty::{Dirty, DirtyOrMaybeDirty};
pub use state_ref::StateRef;

use bindings::{Dependency, Tracker};
use wake::WakeTable;


thread_local! {
    static GLOBALS: RefCell<Globals> = RefCell::new(Globals::default());
}

/// Work queued from places that cannot reach the [`Runtime`] directly.
#[derive(Default)]
struct Globals {
    runtime_alive: bool,
    waiting: bool,
    actions: Vec<Action>,
    notifys: Vec<NotifyTask>,
    unbinds: Vec<Vec<Dependency>>,
    tasks: Tasks,
    wakes: WakeTable,
}

impl Globals {
    fn with<T>(f: impl FnOnce(&mut Self) -> T) -> T {
        GLOBALS.with(|g| f(&mut g.borrow_mut()))
    }
    fn try_with<T>(f: impl FnOnce(&mut Self) -> T) -> Result<T, AccessError> {
        GLOBALS.try_with(|g| f(&mut g.borrow_mut()))
    }

    fn take_actions() -> Vec<Action> {
        Self::with(|g| {
            g.apply_wakes();
            take(&mut g.actions)
        })
    }
    fn take_notifys() -> Vec<NotifyTask> {
        Self::with(|g| {
            g.apply_wakes();
            take(&mut g.notifys)
        })
    }
    fn take_unbinds() -> Vec<Vec<Dependency>> {
        Self::with(|g| take(&mut g.unbinds))
    }
    fn take_tasks(kind: Option<TaskKind>) -> Vec<Task> {
        Self::with(|g| g.tasks.take(kind))
    }

    fn push_action(&mut self, action: Action) {
        if !self.runtime_alive {
            panic!("`Runtime` is not created.");
        }
        self.actions.push(action);
        self.wake_runtime();
    }
    fn push_notify(&mut self, task: NotifyTask) {
        self.notifys.push(task);
        self.wake_runtime();
    }
    fn push_task(&mut self, kind: TaskKind, task: Task) {
        self.tasks.push(kind, task);
        self.wake_runtime();
    }

    fn apply_wakes(&mut self) {
        self.wakes.drain_into(&mut self.notifys);
    }
    fn is_idle(&self) -> bool {
        self.actions.is_empty()
            && self.notifys.is_empty()
            && self.unbinds.is_empty()
            && self.tasks.is_empty()
    }
    fn poll_ready(&mut self, cx: &Context) -> Poll<()> {
        self.waiting = false;
        if !self.is_idle() || self.wakes.poll_ready(cx) {
            return Poll::Ready(());
        }
        self.waiting = true;
        Poll::Pending
    }
    fn wake_runtime(&mut self) {
        if take(&mut self.waiting) {
            self.wakes.wake_runtime();
        }
    }
}

/// Reactive runtime.
///
/// Owns the per-thread event loop: writes are applied through [`ActionContext`],
/// reads go through [`SignalContext`], and [`update`](Self::update) drives
/// effects and cache discards until nothing is left to do.
///
/// Only one `Runtime` may exist on a thread at a time.
#[derive(Ex)]
#[derive_ex(Default)]
#[default(Self::new())]
pub struct Runtime {
    rt: RawRuntime,
}

impl Runtime {
    pub fn new() -> Self {
        Globals::with(|g| {
            if g.runtime_alive {
                panic!("Only one `Runtime` can exist in the same thread at the same time.");
            }
            g.runtime_alive = true;
        });
        trace!("runtime created");
        Self {
            rt: RawRuntime::default(),
        }
    }

    pub fn ac(&mut self) -> &mut ActionContext {
        ActionContext::new(self)
    }

    /// Returns a context for reading state.
    ///
    /// Pending invalidations are applied first, so every read observes the latest write.
    pub fn sc(&mut self) -> SignalContext {
        self.apply_notifys();
        SignalContext {
            rt: &mut self.rt,
            sink: None,
        }
    }
    fn uc(&mut self) -> UpdateContext {
        UpdateContext(SignalContext {
            rt: &mut self.rt,
            sink: None,
        })
    }

    /// Runs spawned actions, including the ones they spawn.
    ///
    /// Returns `true` if any action was run.
    pub fn run_actions(&mut self) -> bool {
        let mut count = 0;
        loop {
            let actions = Globals::take_actions();
            if actions.is_empty() {
                break;
            }
            count += actions.len();
            for action in actions {
                (action.0)(self.ac());
            }
        }
        if count > 0 {
            trace!("ran {count} actions");
        }
        count > 0
    }

    /// Runs scheduled tasks of `kind`, or of every kind in ascending id order if `kind` is `None`.
    ///
    /// Returns `true` if any task was run.
    pub fn run_tasks(&mut self, kind: Option<TaskKind>) -> bool {
        self.apply_notifys();
        let tasks = Globals::take_tasks(kind);
        let count = tasks.len();
        for task in tasks {
            (task.0)(&mut self.uc());
        }
        if count > 0 {
            trace!("ran {count} tasks");
        }
        count > 0
    }

    /// Drops caches nobody depends on any more and releases stale bindings.
    ///
    /// Returns `true` if anything was discarded.
    pub fn run_discards(&mut self) -> bool {
        let mut handled = false;
        loop {
            if let Some(task) = self.rt.discards.pop() {
                (task.0)(&mut self.uc());
            } else if !self.apply_unbinds() {
                break;
            }
            handled = true;
        }
        handled
    }

    /// Runs actions, tasks and discards until none of them has anything left to do.
    pub fn update(&mut self) {
        while self.run_actions() || self.run_tasks(None) || self.run_discards() {}
    }

    /// Waits until [`update`](Self::update) has something to do.
    pub async fn wait_for_ready(&mut self) {
        poll_fn(|cx| Globals::with(|g| g.poll_ready(cx))).await
    }

    fn apply_unbinds(&mut self) -> bool {
        let mut handled = false;
        loop {
            let unbinds = Globals::take_unbinds();
            if unbinds.is_empty() {
                break;
            }
            for b in unbinds.into_iter().flatten() {
                b.unbind(&mut self.uc());
            }
            handled = true;
        }
        handled
    }
    fn apply_notifys(&mut self) {
        self.apply_unbinds();
        loop {
            let notifys = Globals::take_notifys();
            if notifys.is_empty() {
                break;
            }
            for n in notifys {
                if let Some(sink) = n.sink.upgrade() {
                    sink.notify(n.slot, DirtyOrMaybeDirty::Dirty, self.ac().nc());
                }
            }
        }
    }
}
impl Drop for Runtime {
    fn drop(&mut self) {
        let _ = Globals::try_with(|g| g.runtime_alive = false);
    }
}

#[derive(Default)]
struct RawRuntime {
    discards: Vec<Task>,
}

/// Context for bringing cached values up to date.
#[repr(transparent)]
pub struct UpdateContext<'s>(SignalContext<'s>);

impl<'s> UpdateContext<'s> {
    fn new<'a>(sc: &'a mut SignalContext<'s>) -> &'a mut Self {
        unsafe { transmute(sc) }
    }

    /// Registers a task that drops a cache.
    ///
    /// It runs in [`Runtime::run_discards`].
    pub fn schedule_discard(&mut self, task: Task) {
        self.0.rt.discards.push(task);
    }

    /// Calls `f` with a [`SignalContext`] that does not track dependencies.
    pub fn sc_with<T>(&mut self, f: impl FnOnce(&mut SignalContext) -> T) -> T {
        self.0.untrack(f)
    }

    /// Borrows a node's cell, panicking with [`CyclicError`] if the node is being evaluated.
    pub fn borrow<'a, T>(&self, cell: &'a RefCell<T>) -> Ref<'a, T> {
        cell.try_borrow()
            .unwrap_or_else(|_| panic!("{}", CyclicError {}))
    }

    /// Mutably borrows a node's cell, panicking with [`CyclicError`] if the node is being evaluated.
    pub fn borrow_mut<'a, T>(&self, cell: &'a RefCell<T>) -> RefMut<'a, T> {
        cell.try_borrow_mut()
            .unwrap_or_else(|_| panic!("{}", CyclicError {}))
    }
}

/// Context for delivering invalidations.
#[repr(transparent)]
pub struct NotifyContext(ActionContext);

impl NotifyContext {
    fn new(ac: &mut ActionContext) -> &mut Self {
        unsafe { transmute(ac) }
    }
}

/// Queues a `Dirty` notification for `node`.
///
/// Use it only where no [`NotifyContext`] is available; the runtime delivers it before the next read.
pub fn schedule_notify(node: Weak<dyn BindSink>, slot: Slot) {
    let _ = Globals::try_with(|g| g.push_notify(NotifyTask { sink: node, slot }));
}

/// Context for reading state and recording dependencies.
pub struct SignalContext<'s> {
    rt: &'s mut RawRuntime,
    sink: Option<&'s mut Tracker>,
}

impl<'s> SignalContext<'s> {
    pub fn uc(&mut self) -> &mut UpdateContext<'s> {
        UpdateContext::new(self)
    }

    /// Calls `f` with a context whose reads are not recorded as dependencies.
    pub fn untrack<T>(&mut self, f: impl FnOnce(&mut SignalContext) -> T) -> T {
        f(&mut SignalContext {
            rt: self.rt,
            sink: None,
        })
    }
}

/// Node that can be invalidated by its sources.
pub trait BindSink: 'static {
    fn notify(self: Rc<Self>, slot: Slot, dirty: DirtyOrMaybeDirty, nc: &mut NotifyContext);
}

/// Node that can be read by sinks.
pub trait BindSource: 'static {
    /// Brings the node up to date and returns whether the sink bound with `key` must re-evaluate.
    fn check(self: Rc<Self>, slot: Slot, key: BindKey, uc: &mut UpdateContext) -> bool;
    fn unbind(self: Rc<Self>, slot: Slot, key: BindKey, uc: &mut UpdateContext);
}

#[derive(Clone)]
struct NotifyTask {
    sink: Weak<dyn BindSink>,
    slot: Slot,
}

/// Context for changing state.
#[repr(transparent)]
pub struct ActionContext(Runtime);

impl ActionContext {
    fn new(rt: &mut Runtime) -> &mut Self {
        unsafe { transmute(rt) }
    }
    pub fn nc(&mut self) -> &mut NotifyContext {
        NotifyContext::new(self)
    }
    pub fn sc(&mut self) -> SignalContext {
        self.0.sc()
    }
}

/// Queues a write to run on the next [`Runtime::run_actions`].
///
/// # Panics
///
/// Panics if no [`Runtime`] exists on this thread.
pub fn spawn_action(f: impl FnOnce(&mut ActionContext) + 'static) {
    let _ = Globals::try_with(|g| g.push_action(Action(Box::new(f))));
}

struct Action(Box<dyn FnOnce(&mut ActionContext)>);

/// Returns a [`Waker`] that sends a `Dirty` notification to `sink` when woken.
///
/// The notification is delivered the next time the runtime applies pending notifications.
pub fn waker_from_sink(sink: Weak<impl BindSink>, slot: Slot) -> Waker {
    let sink: Weak<dyn BindSink> = sink;
    Globals::with(|g| g.wakes.waker(NotifyTask { sink, slot }))
}

/// Deferred unit of work run by the runtime.
pub struct Task(Box<dyn FnOnce(&mut UpdateContext)>);

impl Task {
    pub fn new(f: impl FnOnce(&mut UpdateContext) + 'static) -> Self {
        Task(Box::new(f))
    }

    /// Creates a task that runs `f` only if `this` is still alive.
    pub fn from_weak_fn<T: 'static>(
        this: Weak<T>,
        f: impl FnOnce(Rc<T>, &mut UpdateContext) + 'static,
    ) -> Self {
        Self::new(move |uc| {
            if let Some(this) = this.upgrade() {
                f(this, uc)
            }
        })
    }

    pub fn schedule_with(self, kind: TaskKind) {
        Globals::with(|g| g.push_task(kind, self))
    }
    pub fn schedule(self) {
        self.schedule_with(TaskKind::default());
    }
}

/// Kind of tasks performed by the reactive runtime.
///
/// Tasks with a smaller `id` run first when [`Runtime::run_tasks`] is called with `None`.
#[derive(Clone, Copy, Display, Debug, Ex)]
#[derive_ex(PartialEq, Eq, Hash, Default)]
#[display("{id}: {name}")]
#[default(Self::new(0, "<default>"))]
pub struct TaskKind {
    id: i8,
    #[eq(ignore)]
    name: &'static str,
}
impl TaskKind {
    pub const fn new(id: i8, name: &'static str) -> Self {
        Self { id, name }
    }
}

#[derive(Default)]
struct Tasks(BTreeMap<i8, Vec<Task>>);

impl Tasks {
    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    fn push(&mut self, kind: TaskKind, task: Task) {
        self.0.entry(kind.id).or_default().push(task);
    }
    fn take(&mut self, kind: Option<TaskKind>) -> Vec<Task> {
        match kind {
            Some(kind) => self.0.remove(&kind.id).unwrap_or_default(),
            None => take(&mut self.0).into_values().flatten().collect(),
        }
    }
}

#[non_exhaustive]
#[derive(Display, Debug)]
#[display("detect cyclic dependency")]
pub struct CyclicError {}

impl std::error::Error for CyclicError {}
