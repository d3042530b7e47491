use crate::sync::Lock;
use std::fmt;
use tracing::error;

/// Scope-bound proof of holding a [`Lock`].
///
/// Only a successful acquisition creates one. Dropping it releases the lock
/// exactly once, synchronously: on fall-through, early return, `?`, panic
/// unwinding, or when the owning task is aborted.
#[must_use = "if unused the Lock will immediately unlock"]
pub struct Guard<'a> {
    lock: &'a Lock,
}

impl<'a> Guard<'a> {
    pub(crate) fn new(lock: &'a Lock) -> Self {
        Self { lock }
    }

    /// Releases the lock now instead of at the end of the scope.
    pub fn unlock(self) {
        drop(self);
    }

    /// The lock this guard holds.
    pub fn lock(&self) -> &'a Lock {
        self.lock
    }
}

impl Drop for Guard<'_> {
    fn drop(&mut self) {
        // Unreachable through the public API, `Lock::release` refuses a
        // guarded lock.
        if !self.lock.release_guard() {
            error!(lock = ?self.lock, "guard dropped on a lock it did not hold");

            if !std::thread::panicking() {
                debug_assert!(false, "lock guard released while not held");
            }
        }
    }
}

impl fmt::Debug for Guard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard").field("lock", self.lock).finish()
    }
}
