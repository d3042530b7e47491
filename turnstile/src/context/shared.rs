use crate::interrupt::Controller;
use crate::task::{JoinHandle, Task, new_task};
#[cfg(test)]
use crate::utils::tracker::Tracker;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use tracing::debug;

/// Scheduler state reachable from inside work items and interrupt handlers.
///
/// The active task list itself stays on the `Scheduler`: it is iterated
/// mutably during a round, so anything a task creates mid-round lands in
/// `spawned` and joins the active set once the round is over.
#[derive(Debug)]
pub(crate) struct Core {
    spawned: RefCell<VecDeque<Task>>,

    pub(crate) interrupts: Controller,

    /// Number of the round in progress, 0 before the first round.
    round: Cell<u64>,

    #[cfg(test)]
    pub(crate) tracker: Tracker,
}

impl Core {
    pub(crate) fn new() -> Self {
        Self {
            spawned: RefCell::new(VecDeque::new()),
            interrupts: Controller::new(),
            round: Cell::new(0),

            #[cfg(test)]
            tracker: Tracker::new(),
        }
    }

    pub(crate) fn spawn<F>(&self, future: F, name: Option<String>) -> JoinHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let (task, handle) = new_task(future, name);
        debug!(task.id = %task.id(), task.name = ?task.name(), round = self.round(), "spawned task");

        self.spawned.borrow_mut().push_back(task);
        handle
    }

    pub(crate) fn take_spawned(&self) -> VecDeque<Task> {
        std::mem::take(&mut *self.spawned.borrow_mut())
    }

    pub(crate) fn num_spawned(&self) -> usize {
        self.spawned.borrow().len()
    }

    pub(crate) fn round(&self) -> u64 {
        self.round.get()
    }

    pub(crate) fn set_round(&self, round: u64) {
        self.round.set(round);
    }
}
