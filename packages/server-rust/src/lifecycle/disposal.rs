//! Resources released when a request's response has fully completed.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tenantscope_core::Disposable;
use tracing::{trace, warn};

/// Registry of resources owned by one request.
///
/// [`dispose_all`](Self::dispose_all) releases everything in reverse
/// registration order and takes effect once; afterwards the registry is
/// closed and late registrations are disposed immediately.
pub struct DisposalRegistry {
    /// `None` once drained.
    pending: Mutex<Option<Vec<Arc<dyn Disposable>>>>,
}

impl DisposalRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(Some(Vec::new())),
        }
    }

    /// Hand ownership of `resource` to the request.
    ///
    /// Returns `false` when the registry was already drained, in which case
    /// the resource has been disposed on the spot.
    pub fn register_for_dispose(&self, resource: Arc<dyn Disposable>) -> bool {
        if let Some(list) = self.pending.lock().as_mut() {
            list.push(resource);
            return true;
        }
        warn!("disposable registered after the request completed; disposing immediately");
        resource.dispose();
        false
    }

    /// Release every registered resource. Returns how many were released by
    /// this call; every call after the first returns 0.
    pub fn dispose_all(&self) -> usize {
        let Some(drained) = self.pending.lock().take() else {
            return 0;
        };
        for resource in drained.iter().rev() {
            resource.dispose();
        }
        trace!(released = drained.len(), "request disposables released");
        drained.len()
    }

    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.pending.lock().is_none()
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().as_ref().map_or(0, Vec::len)
    }
}

impl Default for DisposalRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DisposalRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisposalRegistry")
            .field("pending", &self.pending_count())
            .field("drained", &self.is_drained())
            .finish()
    }
}

/// RAII guard that drains a [`DisposalRegistry`] when dropped.
#[derive(Debug)]
pub struct DisposeOnDrop {
    registry: Arc<DisposalRegistry>,
}

impl DisposeOnDrop {
    #[must_use]
    pub fn new(registry: Arc<DisposalRegistry>) -> Self {
        Self { registry }
    }
}

impl Drop for DisposeOnDrop {
    fn drop(&mut self) {
        self.registry.dispose_all();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;

    /// Disposable that counts how often it was released and logs its label.
    pub(crate) struct Recorder {
        pub(crate) label: &'static str,
        pub(crate) disposed: AtomicUsize,
        pub(crate) log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Recorder {
        pub(crate) fn new(label: &'static str, log: Arc<Mutex<Vec<&'static str>>>) -> Arc<Self> {
            Arc::new(Self {
                label,
                disposed: AtomicUsize::new(0),
                log,
            })
        }
    }

    impl Disposable for Recorder {
        fn dispose(&self) {
            self.disposed.fetch_add(1, Ordering::SeqCst);
            self.log.lock().push(self.label);
        }
    }

    #[test]
    fn drains_in_reverse_order_exactly_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = DisposalRegistry::new();
        let first = Recorder::new("first", log.clone());
        let second = Recorder::new("second", log.clone());
        registry.register_for_dispose(first.clone());
        registry.register_for_dispose(second.clone());
        assert_eq!(registry.pending_count(), 2);

        assert_eq!(registry.dispose_all(), 2);
        assert_eq!(registry.dispose_all(), 0);

        assert_eq!(*log.lock(), vec!["second", "first"]);
        assert_eq!(first.disposed.load(Ordering::SeqCst), 1);
        assert!(registry.is_drained());
    }

    #[test]
    fn late_registration_is_disposed_immediately() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = DisposalRegistry::new();
        registry.dispose_all();

        let late = Recorder::new("late", log.clone());
        assert!(!registry.register_for_dispose(late.clone()));
        assert_eq!(late.disposed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn guard_drains_on_drop() {
        let registry = Arc::new(DisposalRegistry::new());
        let flag = Arc::new(AtomicBool::new(false));

        struct SetFlag(Arc<AtomicBool>);
        impl Disposable for SetFlag {
            fn dispose(&self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        registry.register_for_dispose(Arc::new(SetFlag(flag.clone())));
        drop(DisposeOnDrop::new(registry.clone()));
        assert!(flag.load(Ordering::SeqCst));
        assert!(registry.is_drained());
    }
}
