use crate::task::{AbortHandle, Header, Id, JoinError};
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

/// An owned permission to read a task's final value.
///
/// Awaiting the handle from another task suspends until the target task is
/// finished. Outside of a run, [`JoinHandle::try_take`] reads the value
/// without polling.
///
/// Dropping a `JoinHandle` does not cancel the task, its value is simply
/// discarded.
///
/// ```ignore
/// let mut scheduler = turnstile::Scheduler::new();
/// let handle = scheduler.submit(async { 5 + 3 });
/// scheduler.run_to_completion()?;
///
/// assert_eq!(handle.try_take().unwrap()?, 8);
/// ```
pub struct JoinHandle<T> {
    header: Rc<Header>,
    state: Rc<JoinState<T>>,
}

impl<T> JoinHandle<T> {
    pub(crate) fn new(header: Rc<Header>, state: Rc<JoinState<T>>) -> Self {
        Self { header, state }
    }

    /// Abort the task. See [`AbortHandle::abort`].
    pub fn abort(&self) {
        self.header.request_abort();
    }

    /// Returns `true` once the task reached a terminal stage: finished,
    /// cancelled or failed.
    pub fn is_finished(&self) -> bool {
        self.header.stage().is_terminal()
    }

    pub fn id(&self) -> Id {
        self.header.id
    }

    /// Returns a new `AbortHandle` that can be used to remotely abort this task.
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle::new(self.header.clone())
    }

    /// Takes the task output if it is available.
    ///
    /// Returns `None` while the task is still running, and after the output
    /// was already taken.
    pub fn try_take(&self) -> Option<Result<T, JoinError>> {
        self.state.take()
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = Result<T, JoinError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.state.is_consumed() {
            panic!("`JoinHandle` polled after completion");
        }

        match self.state.take() {
            Some(output) => Poll::Ready(output),
            None => {
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }
}

impl<T> fmt::Debug for JoinHandle<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("JoinHandle")
            .field("id", &self.header.id)
            .field("stage", &self.header.stage())
            .finish()
    }
}

/// Type-erased write side of a task's output slot.
pub(crate) trait Complete {
    fn fail(&self, err: JoinError);
}

enum Slot<T> {
    Empty,
    Ready(Result<T, JoinError>),
    Consumed,
}

pub(crate) struct JoinState<T> {
    slot: RefCell<Slot<T>>,
}

impl<T> JoinState<T> {
    pub(crate) fn new() -> Self {
        Self {
            slot: RefCell::new(Slot::Empty),
        }
    }

    pub(crate) fn complete(&self, output: T) {
        self.store(Ok(output));
    }

    fn store(&self, output: Result<T, JoinError>) {
        let mut slot = self.slot.borrow_mut();
        debug_assert!(matches!(*slot, Slot::Empty), "task output stored twice");
        *slot = Slot::Ready(output);
    }

    fn take(&self) -> Option<Result<T, JoinError>> {
        let mut slot = self.slot.borrow_mut();
        match std::mem::replace(&mut *slot, Slot::Consumed) {
            Slot::Ready(output) => Some(output),
            other => {
                *slot = other;
                None
            }
        }
    }

    fn is_consumed(&self) -> bool {
        matches!(*self.slot.borrow(), Slot::Consumed)
    }
}

impl<T> Complete for JoinState<T> {
    fn fail(&self, err: JoinError) {
        self.store(Err(err));
    }
}
