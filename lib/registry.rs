// Thread-safe listener set with snapshot dispatch
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// A set of shared callback objects.
///
/// Membership is by object identity, so the same `Arc` is never registered twice.
/// Dispatch works on a [`snapshot`](ListenerSet::snapshot), so callbacks may add or
/// remove listeners without affecting the pass in progress.
pub struct ListenerSet<L: ?Sized> {
    listeners: Mutex<Vec<Arc<L>>>,
}

impl<L: ?Sized> ListenerSet<L> {
    pub fn new() -> Self {
        ListenerSet {
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Returns whether the listener was newly added.
    pub fn add(&self, listener: Arc<L>) -> bool {
        let mut listeners = self.listeners.lock();
        if listeners.iter().any(|l| same(l, &listener)) {
            return false;
        }
        listeners.push(listener);
        true
    }

    /// Returns whether the listener was present.
    pub fn remove(&self, listener: &Arc<L>) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|l| !same(l, listener));
        listeners.len() != before
    }

    /// Point-in-time copy in registration order.
    pub fn snapshot(&self) -> Vec<Arc<L>> {
        self.listeners.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    /// Call `f` for every listener registered at the time of the call.
    ///
    /// A panicking listener is logged and skipped; the others still run.
    pub fn for_each(&self, mut f: impl FnMut(&L)) {
        for listener in self.snapshot() {
            isolate(|| f(&*listener));
        }
    }
}

/// Run one listener callback, containing a panic to that callback.
pub(crate) fn isolate(callback: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(callback)) {
        tracing::error!("listener panicked: {}", panic_message(&*payload));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

impl<L: ?Sized> Default for ListenerSet<L> {
    fn default() -> Self {
        Self::new()
    }
}

// compare data pointers only; vtable pointers of the same object may differ
fn same<L: ?Sized>(a: &Arc<L>, b: &Arc<L>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    trait Hook: Send + Sync {
        fn hit(&self);
    }

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl Hook for Counter {
        fn hit(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn set_semantics() {
        let set: ListenerSet<dyn Hook> = ListenerSet::new();
        let a: Arc<dyn Hook> = Arc::new(Counter::default());
        let b: Arc<dyn Hook> = Arc::new(Counter::default());

        assert!(set.add(a.clone()));
        assert!(!set.add(a.clone()));
        assert!(set.add(b.clone()));
        assert_eq!(set.len(), 2);

        assert!(set.remove(&a));
        assert!(!set.remove(&a));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn duplicate_add_delivers_once() {
        let set: ListenerSet<dyn Hook> = ListenerSet::new();
        let counter = Arc::new(Counter::default());
        set.add(counter.clone());
        set.add(counter.clone());

        set.for_each(|l| l.hit());
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    struct SelfRemoving {
        set: Arc<ListenerSet<dyn Hook>>,
        me: parking_lot::Mutex<Option<Arc<dyn Hook>>>,
        late: Arc<Counter>,
        hits: AtomicUsize,
    }

    impl Hook for SelfRemoving {
        fn hit(&self) {
            self.hits.fetch_add(1, Ordering::SeqCst);
            if let Some(me) = self.me.lock().take() {
                self.set.remove(&me);
            }
            self.set.add(self.late.clone());
        }
    }

    #[test]
    fn mutation_during_dispatch_does_not_affect_current_pass() {
        let set: Arc<ListenerSet<dyn Hook>> = Arc::new(ListenerSet::new());
        let late = Arc::new(Counter::default());
        let remover = Arc::new(SelfRemoving {
            set: set.clone(),
            me: parking_lot::Mutex::new(None),
            late: late.clone(),
            hits: AtomicUsize::new(0),
        });
        let as_hook: Arc<dyn Hook> = remover.clone();
        *remover.me.lock() = Some(as_hook.clone());
        set.add(as_hook);

        set.for_each(|l| l.hit());
        assert_eq!(remover.hits.load(Ordering::SeqCst), 1);
        assert_eq!(late.0.load(Ordering::SeqCst), 0);

        set.for_each(|l| l.hit());
        assert_eq!(remover.hits.load(Ordering::SeqCst), 1);
        assert_eq!(late.0.load(Ordering::SeqCst), 1);
    }

    struct Faulty;

    impl Hook for Faulty {
        fn hit(&self) {
            panic!("faulty listener");
        }
    }

    #[test]
    fn panicking_listener_does_not_stop_the_pass() {
        let set: ListenerSet<dyn Hook> = ListenerSet::new();
        let before = Arc::new(Counter::default());
        let after = Arc::new(Counter::default());
        set.add(before.clone());
        set.add(Arc::new(Faulty));
        set.add(after.clone());

        set.for_each(|l| l.hit());
        set.for_each(|l| l.hit());
        assert_eq!(before.0.load(Ordering::SeqCst), 2);
        assert_eq!(after.0.load(Ordering::SeqCst), 2);
    }
}
