//! Simulated interrupts.
//!
//! An interrupt is an out-of-band handler that runs *between two instructions*
//! of the current task, runs to completion, and cannot itself be interrupted.
//! Handlers are plain closures, so they cannot suspend: the suspend-capable
//! [`Lock::acquire`](crate::sync::Lock::acquire) is unavailable to them.
//!
//! Instruction boundaries are explicit. The scheduler delivers pending
//! interrupts before every resume, and a work item marks a boundary inside its
//! own code with [`checkpoint`]. This is what makes races between a task and a
//! handler reproducible: whatever sits between two checkpoints is one
//! instruction.
//!
//! A panicking handler follows the scheduler's
//! [`FailurePolicy`](crate::runtime::FailurePolicy). Delivered at a
//! [`checkpoint`], the panic unwinds through the interrupted task and fails it
//! like any other panic of that task. Delivered between two tasks, it either
//! aborts the run or is logged and dropped. Either way the handler stays
//! registered.
//!
//! ```ignore
//! let mut scheduler = Scheduler::new();
//! scheduler.register_interrupt(Line(1), |frame| {
//!     frame.spawn(async { /* deferred, suspend-capable work */ });
//! });
//!
//! scheduler.submit(async {
//!     interrupt::raise(Line(1));
//!     interrupt::checkpoint(); // the handler runs here
//! });
//! ```

use crate::context::{self, Core};
use crate::task::{self, Id, JoinHandle};
#[cfg(test)]
use crate::utils::tracker::{Call, Method};
use crate::utils::ScopeGuard;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use tracing::{trace, warn};

/// An interrupt line. Lower lines have higher priority when several are
/// pending at the same boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Line(pub u8);

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "irq{}", self.0)
    }
}

/// What an interrupt handler gets to work with.
pub struct InterruptFrame<'a> {
    line: Line,
    core: &'a Core,
}

impl InterruptFrame<'_> {
    pub fn line(&self) -> Line {
        self.line
    }

    /// The task that was running when the interrupt fired, `None` if the
    /// interrupt was delivered between two tasks.
    pub fn interrupted(&self) -> Option<Id> {
        task::try_id()
    }

    /// Defers work to a new task.
    ///
    /// This is the way out for a handler that needs the lock: the spawned task
    /// can use the suspend-capable acquisition and wait for the interrupted
    /// task to release it.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        self.core
            .spawn(future, Some(format!("{}-deferred", self.line)))
    }
}

impl fmt::Debug for InterruptFrame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterruptFrame")
            .field("line", &self.line)
            .finish()
    }
}

pub(crate) type Handler = Box<dyn FnMut(&mut InterruptFrame<'_>)>;

/// Interrupt table, pending set and mask of one scheduler.
pub(crate) struct Controller {
    handlers: RefCell<HashMap<Line, Handler>>,

    pending: RefCell<BTreeSet<Line>>,

    /// Nesting depth of `without_interrupts`.
    mask_depth: Cell<usize>,

    /// Line whose handler is running.
    active: Cell<Option<Line>>,

    delivered: Cell<u64>,
}

impl Controller {
    pub(crate) fn new() -> Self {
        Self {
            handlers: RefCell::new(HashMap::new()),
            pending: RefCell::new(BTreeSet::new()),
            mask_depth: Cell::new(0),
            active: Cell::new(None),
            delivered: Cell::new(0),
        }
    }

    /// Returns `true` if a previous handler was replaced.
    pub(crate) fn register(&self, line: Line, handler: Handler) -> bool {
        self.handlers.borrow_mut().insert(line, handler).is_some()
    }

    /// Returns `false` if no handler is registered for `line`.
    pub(crate) fn raise(&self, line: Line) -> bool {
        if !self.handlers.borrow().contains_key(&line) && self.active.get() != Some(line) {
            warn!(%line, "raised an interrupt line with no handler, ignoring");
            return false;
        }

        self.pending.borrow_mut().insert(line);
        true
    }

    /// Runs every pending interrupt, unless delivery is masked or a handler
    /// is already running.
    pub(crate) fn deliver(&self, core: &Core) {
        if self.active.get().is_some() || self.mask_depth.get() > 0 {
            return;
        }

        while let Some(line) = self.pop_pending() {
            let Some(handler) = self.handlers.borrow_mut().remove(&line) else {
                continue;
            };

            trace!(%line, round = core.round(), interrupted = ?task::try_id(), "delivering interrupt");

            #[cfg(test)]
            core.tracker.record(
                Method::Interrupt,
                Call::Interrupt {
                    line,
                    interrupted: task::try_id(),
                },
            );

            self.delivered.set(self.delivered.get() + 1);

            let mut in_flight = InFlight::start(self, line, handler);
            if let Some(handler) = in_flight.handler.as_mut() {
                handler(&mut InterruptFrame { line, core });
            }
        }
    }

    fn pop_pending(&self) -> Option<Line> {
        self.pending.borrow_mut().pop_first()
    }

    pub(crate) fn mask(&self) {
        self.mask_depth.set(self.mask_depth.get() + 1);
    }

    pub(crate) fn unmask(&self) {
        debug_assert!(self.mask_depth.get() > 0, "unbalanced interrupt unmask");
        self.mask_depth.set(self.mask_depth.get().saturating_sub(1));
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.get().is_some()
    }

    pub(crate) fn delivered(&self) -> u64 {
        self.delivered.get()
    }
}

/// A handler taken out of the table while it runs.
///
/// Dropping it puts the handler back and clears the active line, also when
/// the handler panics, so the line stays registered.
struct InFlight<'a> {
    controller: &'a Controller,
    line: Line,
    handler: Option<Handler>,
}

impl<'a> InFlight<'a> {
    fn start(controller: &'a Controller, line: Line, handler: Handler) -> Self {
        controller.active.set(Some(line));
        Self {
            controller,
            line,
            handler: Some(handler),
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.controller.active.set(None);

        if let Some(handler) = self.handler.take() {
            self.controller
                .handlers
                .borrow_mut()
                .entry(self.line)
                .or_insert(handler);
        }
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines: Vec<Line> = self.handlers.borrow().keys().copied().collect();
        lines.sort();

        f.debug_struct("Controller")
            .field("lines", &lines)
            .field("pending", &self.pending.borrow())
            .field("mask_depth", &self.mask_depth.get())
            .field("active", &self.active.get())
            .finish()
    }
}

/// Marks `line` as pending. It is delivered at the next instruction boundary.
///
/// Raising a line that has no registered handler is ignored.
///
/// # Panics
///
/// Panics when called outside of a running scheduler.
#[track_caller]
pub fn raise(line: Line) {
    context::with_core(|core| core.interrupts.raise(line));
}

/// An instruction boundary: delivers every pending interrupt now.
///
/// Does nothing outside of a running scheduler, inside an interrupt handler,
/// or while interrupts are masked.
pub fn checkpoint() {
    if let Some(core) = context::try_core() {
        core.interrupts.deliver(&core);
    }
}

/// Raises `line` and immediately reaches an instruction boundary.
#[track_caller]
pub fn trigger(line: Line) {
    raise(line);
    checkpoint();
}

/// Runs `f` with interrupt delivery masked.
///
/// Interrupts raised meanwhile stay pending and are delivered as soon as the
/// outermost mask ends. `f` cannot suspend, so the mask never spans a
/// scheduling round.
pub fn without_interrupts<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let Some(core) = context::try_core() else {
        return f();
    };

    let ret = {
        core.interrupts.mask();
        let _unmask = ScopeGuard::new(|| core.interrupts.unmask());
        f()
    };

    core.interrupts.deliver(&core);
    ret
}

/// Returns `true` while an interrupt handler is running on this thread.
pub fn in_interrupt() -> bool {
    context::try_core().is_some_and(|core| core.interrupts.is_active())
}
