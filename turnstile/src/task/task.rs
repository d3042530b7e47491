use crate::task::id::TaskIdGuard;
use crate::task::join::{Complete, JoinState};
use crate::task::{Header, Id, JoinError, JoinHandle, Stage};
use pin_project::pin_project;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

type BoxedWork = Pin<Box<dyn Future<Output = ()>>>;

/// What happened when the scheduler gave a task its turn.
pub(crate) enum Resume {
    /// The work item made bounded progress and wants another turn.
    Pending,

    /// The work item completed. Its output was handed to the `JoinHandle`.
    Ready,

    /// An abort was requested. The work item was dropped without being
    /// resumed.
    Cancelled,

    /// The work item panicked. The scheduler decides whether this aborts the
    /// run or only the task.
    Panicked(Box<dyn Any + Send + 'static>),
}

impl Resume {
    /// Stage of the task right after this resume.
    pub(crate) fn stage(&self) -> Stage {
        match self {
            Resume::Pending => Stage::Running,
            Resume::Ready => Stage::Finished,
            Resume::Cancelled => Stage::Cancelled,
            Resume::Panicked(_) => Stage::Failed,
        }
    }
}

impl fmt::Debug for Resume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Resume::Pending => "Pending",
            Resume::Ready => "Ready",
            Resume::Cancelled => "Cancelled",
            Resume::Panicked(_) => "Panicked",
        })
    }
}

/// Wraps a user work item and moves its output into the join slot when it
/// completes, so the scheduler only deals with `Future<Output = ()>`.
#[pin_project]
struct Harness<F: Future> {
    #[pin]
    future: F,
    state: Rc<JoinState<F::Output>>,
}

impl<F: Future> Future for Harness<F> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.project();
        match this.future.poll(cx) {
            Poll::Ready(output) => {
                this.state.complete(output);
                Poll::Ready(())
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// One logical unit of cooperative execution, owned by the scheduler.
pub(crate) struct Task {
    header: Rc<Header>,

    /// `None` once the work item reported completion, was cancelled or
    /// panicked. A finished work item is never resumed.
    work: Option<BoxedWork>,

    join: Rc<dyn Complete>,
}

pub(crate) fn new_task<F>(future: F, name: Option<String>) -> (Task, JoinHandle<F::Output>)
where
    F: Future + 'static,
    F::Output: 'static,
{
    let header = Rc::new(Header::new(Id::next(), name));
    let state = Rc::new(JoinState::new());

    let work = Box::pin(Harness {
        future,
        state: state.clone(),
    });

    let task = Task {
        header: header.clone(),
        work: Some(work),
        join: state.clone(),
    };

    (task, JoinHandle::new(header, state))
}

impl Task {
    pub(crate) fn id(&self) -> Id {
        self.header.id
    }

    pub(crate) fn name(&self) -> Option<&str> {
        self.header.name.as_deref()
    }

    pub(crate) fn stage(&self) -> Stage {
        self.header.stage()
    }

    /// Gives the task one turn: resumes its work item by exactly one step.
    ///
    /// # Panics
    ///
    /// Resuming a task whose work item already completed is a protocol
    /// violation and panics immediately.
    #[track_caller]
    pub(crate) fn resume(&mut self, cx: &mut Context<'_>) -> Resume {
        let Some(mut work) = self.work.take() else {
            panic!(
                "FATAL: task {} resumed after reaching stage {:?}",
                self.id(),
                self.stage()
            );
        };

        if self.header.is_abort_requested() {
            drop_work(work);
            self.header.set_stage(Stage::Cancelled);
            self.join.fail(JoinError::cancelled(self.id()));
            return Resume::Cancelled;
        }

        let res = {
            let _guard = TaskIdGuard::enter(self.id());
            panic::catch_unwind(AssertUnwindSafe(|| work.as_mut().poll(cx)))
        };

        match res {
            Ok(Poll::Pending) => {
                self.work = Some(work);
                Resume::Pending
            }
            Ok(Poll::Ready(())) => {
                drop_work(work);
                self.header.set_stage(Stage::Finished);
                Resume::Ready
            }
            Err(payload) => {
                drop_work(work);
                self.header.set_stage(Stage::Failed);
                Resume::Panicked(payload)
            }
        }
    }

    /// Hands a failure to the task's `JoinHandle`.
    pub(crate) fn fail(&self, err: JoinError) {
        self.join.fail(err);
    }
}

// Dropping a work item runs arbitrary destructors, which may panic too.
fn drop_work(work: BoxedWork) {
    let _ = panic::catch_unwind(AssertUnwindSafe(move || drop(work)));
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("stage", &self.stage())
            .finish()
    }
}
