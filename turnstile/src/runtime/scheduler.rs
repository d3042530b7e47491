use crate::context::{self, Core};
use crate::interrupt::{InterruptFrame, Line};
use crate::runtime::{FailurePolicy, RunError, RuntimeConfig};
use crate::task::{Id, JoinError, JoinHandle, Resume, Stage, Task, new_task, panic_payload_as_str};
#[cfg(test)]
use crate::utils::tracker::{Call, Method, Tracker};
use anyhow::Result;
use futures::task::noop_waker_ref;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::task::Context;
use tracing::{debug, trace, warn};

/// What a call to [`Scheduler::run_to_completion`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Visitation passes over the active set.
    pub rounds: u64,

    /// Work item resumes, summed over every round.
    pub resumes: u64,

    pub completed: usize,

    pub cancelled: usize,

    /// Tasks whose work item panicked. Only ever non-empty under
    /// [`FailurePolicy::Isolate`].
    pub failed: Vec<Id>,

    /// Interrupt handlers that ran.
    pub interrupts: u64,

    /// Handlers that panicked between two tasks under
    /// [`FailurePolicy::Isolate`]. A handler panic at a checkpoint fails the
    /// interrupted task instead and shows up in `failed`.
    pub interrupt_panics: u64,
}

/// Single-threaded round-robin scheduler.
///
/// Each round gives every active task exactly one turn, in submission order.
/// At the end of the round every task that finished, was cancelled or failed
/// is removed, and tasks spawned during the round join the back of the active
/// set. The run returns once the active set is empty.
///
/// Tasks are resumed no matter what their waker says: a work item that returns
/// `Pending` is polled again next round. It follows that a work item which
/// never completes keeps the run going forever, unless
/// [`Builder::max_rounds`](crate::runtime::Builder::max_rounds) bounds it.
pub struct Scheduler {
    cfg: RuntimeConfig,

    /// Active set, in visitation order.
    tasks: Vec<Task>,

    core: Rc<Core>,
}

impl Scheduler {
    /// Creates a scheduler with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub(crate) fn with_config(cfg: RuntimeConfig) -> Self {
        Self {
            cfg,
            tasks: Vec::new(),
            core: Rc::new(Core::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.cfg.name
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.cfg.failure_policy
    }

    /// Adds a task to the end of the active set.
    pub fn submit<F>(&mut self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let (task, handle) = new_task(future, None);
        self.admit(task);
        handle
    }

    /// Like [`submit`](Self::submit). The name shows up in log events.
    pub fn submit_named<F>(&mut self, name: impl Into<String>, future: F) -> JoinHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let (task, handle) = new_task(future, Some(name.into()));
        self.admit(task);
        handle
    }

    /// Number of tasks that have not reached a terminal stage yet.
    pub fn len(&self) -> usize {
        self.tasks.len() + self.core.num_spawned()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Installs the handler for `line`, replacing any previous one.
    ///
    /// The handler runs whenever `line` is pending at an instruction
    /// boundary. See the [`interrupt`](crate::interrupt) module.
    pub fn register_interrupt<H>(&mut self, line: Line, handler: H)
    where
        H: FnMut(&mut InterruptFrame<'_>) + 'static,
    {
        if self.core.interrupts.register(line, Box::new(handler)) {
            debug!(scheduler = %self.cfg.name, %line, "replaced interrupt handler");
        }
    }

    /// Runs rounds until every task reached a terminal stage.
    ///
    /// Fails with [`RunError::AlreadyRunning`] when called from inside a
    /// running scheduler, and with [`RunError::RoundLimitExceeded`] when the
    /// configured round limit is reached first.
    ///
    /// # Panics
    ///
    /// Under [`FailurePolicy::Propagate`], a panicking work item stops the run
    /// and its panic resumes here.
    pub fn run_to_completion(&mut self) -> Result<RunReport> {
        let _ctx = context::enter(self.core.clone())?;
        let delivered = self.core.interrupts.delivered();
        let mut report = RunReport::default();

        // A previous run may have been cut short by a propagated panic.
        self.cleanup(&mut report);
        self.admit_spawned();

        debug!(scheduler = %self.cfg.name, tasks = self.tasks.len(), "run started");

        let mut cx = Context::from_waker(noop_waker_ref());

        while !self.tasks.is_empty() {
            if let Some(limit) = self.cfg.max_rounds
                && report.rounds >= limit
            {
                warn!(scheduler = %self.cfg.name, limit, active = self.tasks.len(), "round limit reached");
                return Err(RunError::RoundLimitExceeded {
                    limit,
                    active: self.tasks.len(),
                }
                .into());
            }

            report.rounds += 1;
            self.core.set_round(self.core.round() + 1);

            self.run_round(&mut cx, &mut report);
            self.cleanup(&mut report);
            self.admit_spawned();
        }

        report.interrupts = self.core.interrupts.delivered() - delivered;

        debug!(
            scheduler = %self.cfg.name,
            rounds = report.rounds,
            resumes = report.resumes,
            completed = report.completed,
            cancelled = report.cancelled,
            failed = report.failed.len(),
            interrupt_panics = report.interrupt_panics,
            "run finished"
        );

        Ok(report)
    }

    /// Submits `future` as the root task, runs to completion and returns its
    /// output.
    ///
    /// Tasks already submitted, and everything spawned meanwhile, run too.
    ///
    /// # Panics
    ///
    /// Panics if the run fails, if the root task panicked, or if it was
    /// aborted.
    #[track_caller]
    pub fn block_on<F>(&mut self, future: F) -> F::Output
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let handle = self.submit_named("block_on", future);

        if let Err(err) = self.run_to_completion() {
            panic!("{}: {err:#}", self.cfg.name);
        }

        match handle.try_take() {
            Some(Ok(output)) => output,
            Some(Err(err)) if err.is_panic() => panic::resume_unwind(err.into_panic()),
            Some(Err(err)) => panic!("{err}"),
            None => panic!("FATAL: root task {} has no output after the run", handle.id()),
        }
    }

    fn run_round(&mut self, cx: &mut Context<'_>, report: &mut RunReport) {
        let round = self.core.round();

        for task in self.tasks.iter_mut() {
            // Instruction boundary between two tasks.
            let delivered = panic::catch_unwind(AssertUnwindSafe(|| {
                self.core.interrupts.deliver(&self.core)
            }));

            if let Err(payload) = delivered {
                match self.cfg.failure_policy {
                    FailurePolicy::Propagate => panic::resume_unwind(payload),
                    FailurePolicy::Isolate => {
                        warn!(
                            round,
                            panic = panic_payload_as_str(&*payload).unwrap_or("<non-string payload>"),
                            "interrupt handler panicked"
                        );
                        report.interrupt_panics += 1;
                    }
                }
            }

            let resume = task.resume(cx);
            report.resumes += 1;

            trace!(
                task.id = %task.id(),
                task.name = ?task.name(),
                round,
                stage = ?resume.stage(),
                "resumed task"
            );

            #[cfg(test)]
            self.core.tracker.record(
                Method::Resume,
                Call::Resume {
                    id: task.id(),
                    round,
                    stage: resume.stage(),
                },
            );

            if let Resume::Panicked(payload) = resume {
                match self.cfg.failure_policy {
                    FailurePolicy::Propagate => {
                        task.fail(JoinError::panic(task.id(), describe(&*payload)));
                        panic::resume_unwind(payload);
                    }
                    FailurePolicy::Isolate => {
                        warn!(
                            task.id = %task.id(),
                            task.name = ?task.name(),
                            round,
                            panic = panic_payload_as_str(&*payload).unwrap_or("<non-string payload>"),
                            "task panicked"
                        );
                        task.fail(JoinError::panic(task.id(), payload));
                    }
                }
            }
        }
    }

    /// Removes every task that reached a terminal stage.
    fn cleanup(&mut self, report: &mut RunReport) {
        let before = self.tasks.len();

        self.tasks.retain(|task| {
            let stage = task.stage();
            match stage {
                Stage::Running => return true,
                Stage::Finished => report.completed += 1,
                Stage::Cancelled => report.cancelled += 1,
                Stage::Failed => report.failed.push(task.id()),
            }

            #[cfg(test)]
            self.core.tracker.record(
                Method::Release,
                Call::Release {
                    id: task.id(),
                    stage,
                },
            );

            false
        });

        if self.tasks.len() != before {
            debug!(
                scheduler = %self.cfg.name,
                removed = before - self.tasks.len(),
                active = self.tasks.len(),
                "cleaned up terminal tasks"
            );
        }
    }

    fn admit_spawned(&mut self) {
        for task in self.core.take_spawned() {
            self.admit(task);
        }
    }

    fn admit(&mut self, task: Task) {
        debug!(
            scheduler = %self.cfg.name,
            task.id = %task.id(),
            task.name = ?task.name(),
            "submitted task"
        );

        #[cfg(test)]
        self.core.tracker.record(
            Method::Submit,
            Call::Submit {
                id: task.id(),
                name: task.name().map(str::to_owned),
            },
        );

        self.tasks.push(task);
    }
}

// The join handle of a task whose panic is resumed on the caller still gets
// the message, the payload itself travels with the unwind.
fn describe(payload: &(dyn Any + Send)) -> Box<dyn Any + Send + 'static> {
    Box::new(
        panic_payload_as_str(payload)
            .unwrap_or("<non-string payload>")
            .to_owned(),
    )
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("cfg", &self.cfg)
            .field("tasks", &self.tasks)
            .field("core", &self.core)
            .finish()
    }
}

// Test-only helpers
#[cfg(test)]
impl Scheduler {
    pub(crate) fn tracker(&self) -> &Tracker {
        &self.core.tracker
    }
}
