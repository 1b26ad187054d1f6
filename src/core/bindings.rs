use std::{
    mem::{replace, take},
    rc::{Rc, Weak},
};

use slabmap::SlabMap;

use super::{
    BindSink, BindSource, Dirty, DirtyOrMaybeDirty, Globals, NotifyContext, SignalContext,
    UpdateContext,
};

/// Index of an input or output of a node.
///
/// A node with several independent inputs uses a distinct slot for each of them.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Slot(pub usize);

/// Position of one dependent in the [`SinkBindings`] of a source.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct BindKey(usize);

/// Edge from a dependent to one of the sources it read.
pub(super) struct Dependency {
    node: Rc<dyn BindSource>,
    output: Slot,
    key: BindKey,
}
impl Dependency {
    fn points_to(&self, node: &Rc<dyn BindSource>, output: Slot) -> bool {
        self.output == output && Rc::ptr_eq(&self.node, node)
    }
    fn changed(&self, uc: &mut UpdateContext) -> bool {
        Rc::clone(&self.node).check(self.output, self.key, uc)
    }
    pub(super) fn unbind(self, uc: &mut UpdateContext) {
        self.node.unbind(self.output, self.key, uc)
    }
}

/// Dependencies recorded by a sink during its last evaluation, in read order.
#[derive(Default)]
pub struct SourceBindings(Vec<Dependency>);

impl SourceBindings {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Returns `true` if any source changed since it was last read.
    ///
    /// Stops at the first changed source; later sources are not brought up to date.
    pub fn check(&self, uc: &mut UpdateContext) -> bool {
        self.0.iter().any(|d| d.changed(uc))
    }

    /// Resolves `MaybeDirty` in place, then returns whether `level` is `Dirty`.
    pub(super) fn resolve(&self, level: &mut Dirty, uc: &mut UpdateContext) -> bool {
        if level.is_maybe_dirty() {
            *level = Dirty::from_is_dirty(self.check(uc));
        }
        level.is_dirty()
    }

    /// Evaluates `f` while recording the sources it reads.
    ///
    /// Sources read in the previous evaluation but not in this one are unbound.
    pub fn update<T>(
        &mut self,
        node: Weak<dyn BindSink>,
        input: Slot,
        f: impl FnOnce(&mut SignalContext) -> T,
        uc: &mut UpdateContext,
    ) -> T {
        let mut tracker = Tracker {
            node,
            input,
            deps: take(&mut self.0),
            cursor: 0,
        };
        let value = f(&mut SignalContext {
            rt: uc.0.rt,
            sink: Some(&mut tracker),
        });
        let Tracker {
            mut deps, cursor, ..
        } = tracker;
        for d in deps.drain(cursor..) {
            d.unbind(uc);
        }
        self.0 = deps;
        value
    }

    pub fn clear(&mut self, uc: &mut UpdateContext) {
        for d in take(&mut self.0) {
            d.unbind(uc);
        }
    }
}
impl Drop for SourceBindings {
    fn drop(&mut self) {
        let deps = take(&mut self.0);
        if !deps.is_empty() {
            let _ = Globals::try_with(|g| g.unbinds.push(deps));
        }
    }
}

/// Dependent being evaluated, collecting the sources it reads.
///
/// Dependencies before `cursor` were read in this evaluation; the rest are from the previous one.
pub(super) struct Tracker {
    node: Weak<dyn BindSink>,
    input: Slot,
    deps: Vec<Dependency>,
    cursor: usize,
}
impl Tracker {
    fn read_again(&mut self, node: &Rc<dyn BindSource>, output: Slot) -> Option<BindKey> {
        let d = self.deps.get(self.cursor).filter(|d| d.points_to(node, output))?;
        let key = d.key;
        self.cursor += 1;
        Some(key)
    }

    #[must_use]
    fn record(&mut self, dep: Dependency) -> Option<Dependency> {
        let at = self.cursor;
        self.cursor += 1;
        if let Some(d) = self.deps.get_mut(at) {
            Some(replace(d, dep))
        } else {
            self.deps.push(dep);
            None
        }
    }
}

struct Dependent {
    node: Weak<dyn BindSink>,
    input: Slot,
    level: Dirty,
}

/// Dependents of a source, each with the level it has been told about.
#[derive(Default)]
pub struct SinkBindings(SlabMap<Dependent>);

impl SinkBindings {
    pub fn new() -> Self {
        Self(SlabMap::new())
    }

    /// Records that the sink currently evaluated in `sc` reads `this`.
    pub fn bind(&mut self, this: Rc<dyn BindSource>, output: Slot, sc: &mut SignalContext) {
        let Some(tracker) = sc.sink.as_deref_mut() else {
            return;
        };
        if let Some(key) = tracker.read_again(&this, output) {
            self.0[key.0].level = Dirty::Clean;
            return;
        }
        let key = BindKey(self.0.insert(Dependent {
            node: tracker.node.clone(),
            input: tracker.input,
            level: Dirty::Clean,
        }));
        let displaced = tracker.record(Dependency {
            node: this,
            output,
            key,
        });
        if let Some(d) = displaced {
            d.unbind(sc.uc());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns whether the dependent bound with `key` must re-evaluate.
    ///
    /// The source must have been brought up to date first.
    pub fn is_dirty(&self, key: BindKey, _uc: &mut UpdateContext) -> bool {
        let level = self.0[key.0].level;
        assert!(
            !level.is_maybe_dirty(),
            "`is_dirty` called before the source was updated"
        );
        level.is_dirty()
    }
    pub fn unbind(&mut self, key: BindKey, _uc: &mut UpdateContext) {
        self.0.remove(key.0);
    }

    /// Raises every dependent to `level`, forwarding to the ones that were clean.
    pub fn notify(&mut self, level: DirtyOrMaybeDirty, nc: &mut NotifyContext) {
        self.0.optimize();
        for d in self.0.values_mut() {
            let forward = d.level.needs_notify();
            d.level |= level;
            if !forward {
                continue;
            }
            if let Some(node) = d.node.upgrade() {
                node.notify(d.input, level, nc);
            }
        }
    }

    /// Settles `MaybeDirty` dependents once the source has re-evaluated.
    pub fn update(&mut self, is_dirty: bool, _uc: &mut UpdateContext) {
        self.0.optimize();
        let settled = Dirty::from_is_dirty(is_dirty);
        for d in self.0.values_mut().filter(|d| d.level.is_maybe_dirty()) {
            d.level = settled;
        }
    }
}

/// Sources of one sink slot, plus whether they may have changed since the last evaluation.
///
/// Starts out `Dirty` so that the first [`check`](Self::check) asks for an evaluation.
pub struct SourceBinder {
    node: Weak<dyn BindSink>,
    input: Slot,
    deps: SourceBindings,
    level: Dirty,
}

impl SourceBinder {
    pub fn new(node: &Weak<impl BindSink>, input: Slot) -> Self {
        let node: Weak<dyn BindSink> = node.clone();
        Self {
            node,
            input,
            deps: SourceBindings::new(),
            level: Dirty::Dirty,
        }
    }
    pub fn is_clean(&self) -> bool {
        self.level.is_clean()
    }

    /// Returns `true` if the sink must re-evaluate, bringing `MaybeDirty` sources up to date first.
    pub fn check(&mut self, uc: &mut UpdateContext) -> bool {
        self.deps.resolve(&mut self.level, uc)
    }

    /// Evaluates `f`, records what it reads, and marks the binder clean.
    pub fn update<T>(
        &mut self,
        f: impl FnOnce(&mut SignalContext) -> T,
        uc: &mut UpdateContext,
    ) -> T {
        self.level = Dirty::Clean;
        self.deps.update(self.node.clone(), self.input, f, uc)
    }

    /// Unbinds every source; the next `check` returns `true`.
    pub fn clear(&mut self, uc: &mut UpdateContext) {
        self.deps.clear(uc);
        self.level = Dirty::Dirty;
    }

    /// Merges a notification into the level.
    ///
    /// Returns `true` if the binder was clean, meaning the sink's own dependents still have to be told.
    pub fn on_notify(&mut self, input: Slot, level: DirtyOrMaybeDirty) -> bool {
        if input != self.input {
            return false;
        }
        let was_clean = self.level.needs_notify();
        self.level |= level;
        was_clean
    }
}
