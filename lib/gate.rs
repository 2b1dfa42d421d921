// Serializes lifecycle notifications that originate on different threads
use parking_lot::ReentrantMutex;
use std::cell::Cell;

thread_local! {
    static HELD: Cell<usize> = const { Cell::new(0) };
}

/// Lock under which connect and disconnect notifications are delivered.
///
/// A peer's "connected" is announced by the accept thread and its "disconnected"
/// by its own receive thread; both go through the same gate, so the second can
/// never be observed before the first. Reentrant, so a callback may trigger
/// another notification on the same thread.
pub(crate) struct NotifyGate {
    lock: ReentrantMutex<()>,
}

impl NotifyGate {
    pub fn new() -> Self {
        NotifyGate {
            lock: ReentrantMutex::new(()),
        }
    }

    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.lock.lock();
        let _held = HeldMarker::enter();
        f()
    }

    /// True while the current thread is inside any gate's `run`.
    ///
    /// Waiting for another thread that needs a gate from here could deadlock.
    pub fn held_by_current_thread() -> bool {
        HELD.with(|held| held.get() > 0)
    }
}

struct HeldMarker;

impl HeldMarker {
    fn enter() -> Self {
        HELD.with(|held| held.set(held.get() + 1));
        HeldMarker
    }
}

impl Drop for HeldMarker {
    fn drop(&mut self) {
        HELD.with(|held| held.set(held.get() - 1));
    }
}
