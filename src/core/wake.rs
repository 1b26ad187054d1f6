use std::{
    mem::take,
    sync::{Arc, Mutex, MutexGuard},
    task::{Context, Waker},
};

use futures::task::{waker, ArcWake};
use slabmap::SlabMap;

use super::NotifyTask;

/// Sinks that can be woken from a [`Waker`], by key.
#[derive(Default)]
pub(super) struct WakeTable {
    sinks: SlabMap<NotifyTask>,
    queue: WakeQueue,
}

impl WakeTable {
    pub(super) fn waker(&mut self, task: NotifyTask) -> Waker {
        let key = self.sinks.insert(task);
        waker(Arc::new(SinkWaker {
            queue: self.queue.clone(),
            key,
        }))
    }

    /// Moves woken sinks into `notifys` and forgets sinks whose wakers are gone.
    pub(super) fn drain_into(&mut self, notifys: &mut Vec<NotifyTask>) {
        let mut q = self.queue.lock();
        for key in q.woken.drain(..) {
            if let Some(task) = self.sinks.get(key) {
                notifys.push(task.clone());
            }
        }
        for key in q.dropped.drain(..) {
            self.sinks.remove(key);
        }
    }

    /// Returns `true` if wakes are queued; otherwise stores `cx`'s waker to be woken later.
    pub(super) fn poll_ready(&self, cx: &Context) -> bool {
        let mut q = self.queue.lock();
        if !q.woken.is_empty() || !q.dropped.is_empty() {
            return true;
        }
        q.runtime = Some(cx.waker().clone());
        false
    }
    pub(super) fn wake_runtime(&self) {
        self.queue.wake_runtime();
    }
}

#[derive(Clone, Default)]
struct WakeQueue(Arc<Mutex<PendingWakes>>);

#[derive(Default)]
struct PendingWakes {
    woken: Vec<usize>,
    dropped: Vec<usize>,
    runtime: Option<Waker>,
}

impl WakeQueue {
    fn lock(&self) -> MutexGuard<PendingWakes> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
    fn wake_runtime(&self) {
        let runtime = take(&mut self.lock().runtime);
        if let Some(runtime) = runtime {
            runtime.wake();
        }
    }
}

struct SinkWaker {
    queue: WakeQueue,
    key: usize,
}
impl ArcWake for SinkWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.queue.lock().woken.push(arc_self.key);
        arc_self.queue.wake_runtime();
    }
}
impl Drop for SinkWaker {
    fn drop(&mut self) {
        self.queue.lock().dropped.push(self.key);
    }
}
