use std::fmt;
use std::sync::{Arc, Mutex};

use crate::actor::lock;

type CancelFn = Box<dyn FnOnce() + Send>;

/// Handle that withdraws an in-flight operation.
///
/// Cancellation is cooperative: the first `cancel` runs the registered
/// function, later calls are no-ops. Clones share the same underlying
/// function.
#[derive(Clone)]
pub struct Cancelable {
    inner: Arc<Mutex<Option<CancelFn>>>,
}

impl Cancelable {
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(Box::new(f)))),
        }
    }

    /// A handle with nothing to cancel.
    pub fn noop() -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
        }
    }

    pub fn cancel(&self) {
        let f = lock(&self.inner).take();
        if let Some(f) = f {
            f();
        }
    }

    /// Whether `cancel` has already run (or there never was anything to cancel).
    pub fn is_spent(&self) -> bool {
        lock(&self.inner).is_none()
    }
}

impl fmt::Debug for Cancelable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cancelable")
            .field("spent", &self.is_spent())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_cancel_runs_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let handle = Cancelable::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        let other = handle.clone();

        handle.cancel();
        other.cancel();
        handle.cancel();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(other.is_spent());
    }

    #[test]
    fn test_noop_is_spent() {
        let handle = Cancelable::noop();
        handle.cancel();
        assert!(handle.is_spent());
    }
}
