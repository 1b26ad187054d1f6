use std::{cell::RefCell, mem::take, rc::Rc};

use log::trace;

use crate::{
    core::{
        BindSink, DirtyOrMaybeDirty, NotifyContext, Slot, SourceBinder, Task, TaskKind,
        UpdateContext,
    },
    SignalContext, Subscription,
};


/// Runs `f` now and again whenever a value it read changes.
///
/// Runs are deferred to [`Runtime::update`](crate::core::Runtime::update)
/// (or [`run_tasks`](crate::core::Runtime::run_tasks) with the default [`TaskKind`]),
/// so several writes in one turn cause a single run that sees the last of them.
/// A change that turns out not to affect any value read does not cause a run.
///
/// Dropping the returned [`Subscription`] stops the effect.
pub fn effect(f: impl FnMut(&mut SignalContext) + 'static) -> Subscription {
    effect_with(f, TaskKind::default())
}

/// [`effect`] whose runs belong to `kind`.
pub fn effect_with(
    mut f: impl FnMut(&mut SignalContext) + 'static,
    kind: TaskKind,
) -> Subscription {
    effect_scoped_with(
        move |sc| {
            f(sc);
            Subscription::empty()
        },
        kind,
    )
}

/// [`effect`] whose runs return a cleanup.
///
/// The [`Subscription`] returned by a run is dropped just before the next run
/// and when the effect itself is dropped.
pub fn effect_scoped(f: impl FnMut(&mut SignalContext) -> Subscription + 'static) -> Subscription {
    effect_scoped_with(f, TaskKind::default())
}

pub fn effect_scoped_with(
    f: impl FnMut(&mut SignalContext) -> Subscription + 'static,
    kind: TaskKind,
) -> Subscription {
    let node = Rc::new_cyclic(|this| EffectNode {
        kind,
        state: RefCell::new(EffectState {
            f,
            sb: SourceBinder::new(this, Slot(0)),
            cleanup: Subscription::empty(),
            runs: 0,
        }),
    });
    node.schedule();
    Subscription::from_rc(node)
}

struct EffectState<F> {
    f: F,
    sb: SourceBinder,
    cleanup: Subscription,
    runs: u64,
}

struct EffectNode<F> {
    kind: TaskKind,
    state: RefCell<EffectState<F>>,
}

impl<F> EffectNode<F>
where
    F: FnMut(&mut SignalContext) -> Subscription + 'static,
{
    fn schedule(self: &Rc<Self>) {
        Task::from_weak_fn(Rc::downgrade(self), Self::run).schedule_with(self.kind);
    }

    fn run(self: Rc<Self>, uc: &mut UpdateContext) {
        let previous = {
            let mut s = self.state.borrow_mut();
            if !s.sb.check(uc) {
                return;
            }
            take(&mut s.cleanup)
        };
        // the previous cleanup may touch the runtime, so it runs with no borrow held
        drop(previous);

        let s = &mut *self.state.borrow_mut();
        s.cleanup = s.sb.update(|sc| (s.f)(sc), uc);
        s.runs += 1;
        trace!("effect ({}) run #{}", self.kind, s.runs);
    }
}

impl<F> BindSink for EffectNode<F>
where
    F: FnMut(&mut SignalContext) -> Subscription + 'static,
{
    fn notify(self: Rc<Self>, slot: Slot, dirty: DirtyOrMaybeDirty, _nc: &mut NotifyContext) {
        let needs_run = self.state.borrow_mut().sb.on_notify(slot, dirty);
        if needs_run {
            self.schedule();
        }
    }
}
