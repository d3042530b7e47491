/// Runs a closure when it goes out of scope, whether the scope ends by normal
/// fall-through, early return or unwinding.
///
/// Used for the bits of scheduler state that must be restored no matter how a
/// task or interrupt handler exits: the thread-local context, the interrupt
/// mask depth and the "inside a handler" flag.
pub(crate) struct ScopeGuard<F: FnOnce()> {
    // Taken on drop so the closure runs at most once.
    closure: Option<F>,
}

impl<F: FnOnce()> ScopeGuard<F> {
    pub(crate) fn new(closure: F) -> Self {
        ScopeGuard {
            closure: Some(closure),
        }
    }
}

impl<F: FnOnce()> Drop for ScopeGuard<F> {
    fn drop(&mut self) {
        if let Some(closure) = self.closure.take() {
            closure();
        }
    }
}
