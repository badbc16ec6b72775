use std::collections::HashMap;
use std::sync::Arc;

use kestrel_remote::ThreadId;
use parking_lot::Mutex;

/// One lock per target thread: evaluations that may invoke code on the same
/// thread run one after another. Different threads do not block each other.
#[derive(Default)]
pub struct ThreadLocks {
    locks: Mutex<HashMap<ThreadId, Arc<Mutex<()>>>>,
}

impl ThreadLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_thread<R>(&self, thread: ThreadId, f: impl FnOnce() -> R) -> R {
        let lock = self.locks.lock().entry(thread).or_default().clone();
        let _guard = lock.lock();
        f()
    }

    /// Forget locks for threads nobody is waiting on.
    pub fn prune(&self) {
        self.locks
            .lock()
            .retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}
