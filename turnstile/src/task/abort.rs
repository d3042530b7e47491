use crate::task::{Header, Id};
use std::fmt;
use std::rc::Rc;

/// An owned permission to abort a task, without awaiting its completion.
///
/// Dropping an `AbortHandle` releases the permission to terminate the task,
/// it does *not* abort the task.
#[derive(Clone)]
pub struct AbortHandle {
    header: Rc<Header>,
}

impl AbortHandle {
    pub(crate) fn new(header: Rc<Header>) -> Self {
        Self { header }
    }

    /// Abort the task associated with the handle.
    ///
    /// The scheduler observes the request on the task's next turn: instead of
    /// resuming the work item it drops it, which runs the destructors of
    /// everything the work item owns (lock guards included). The join handle
    /// then yields a cancelled [`JoinError`](crate::task::JoinError).
    ///
    /// Aborting a task that already finished does nothing.
    pub fn abort(&self) {
        self.header.request_abort();
    }

    /// Checks if the task associated with this `AbortHandle` has finished.
    ///
    /// This returns `false` right after `abort` until the scheduler observed
    /// the request.
    pub fn is_finished(&self) -> bool {
        self.header.stage().is_terminal()
    }

    pub fn id(&self) -> Id {
        self.header.id
    }
}

impl fmt::Debug for AbortHandle {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("AbortHandle")
            .field("id", &self.header.id)
            .finish()
    }
}
