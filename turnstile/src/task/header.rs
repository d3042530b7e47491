use crate::task::Id;
use std::cell::Cell;

/// Where a task is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Submitted and not finished yet. The scheduler resumes it every round.
    Running,

    /// The work item reported `Ready`.
    Finished,

    /// The task was aborted before its work item completed.
    Cancelled,

    /// The work item panicked while the scheduler isolates failures.
    Failed,
}

impl Stage {
    /// A terminal task is never resumed again and is removed by the next
    /// cleanup pass.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Stage::Running)
    }
}

/// State shared between a task and the handles pointing at it.
#[derive(Debug)]
pub(crate) struct Header {
    pub(crate) id: Id,

    pub(crate) name: Option<String>,

    stage: Cell<Stage>,

    abort_requested: Cell<bool>,
}

impl Header {
    pub(crate) fn new(id: Id, name: Option<String>) -> Self {
        Self {
            id,
            name,
            stage: Cell::new(Stage::Running),
            abort_requested: Cell::new(false),
        }
    }

    pub(crate) fn stage(&self) -> Stage {
        self.stage.get()
    }

    pub(crate) fn set_stage(&self, stage: Stage) {
        debug_assert!(
            !self.stage.get().is_terminal(),
            "task {} already reached a terminal stage",
            self.id
        );
        self.stage.set(stage);
    }

    /// Aborting a task that already reached a terminal stage does nothing.
    pub(crate) fn request_abort(&self) {
        if !self.stage().is_terminal() {
            self.abort_requested.set(true);
        }
    }

    pub(crate) fn is_abort_requested(&self) -> bool {
        self.abort_requested.get()
    }
}
