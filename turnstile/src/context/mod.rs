//! Thread-local access to the scheduler that is currently running.
//!
//! `run_to_completion` installs its [`Core`] here for the duration of the run,
//! which is how free functions such as [`spawn`](crate::spawn),
//! [`interrupt::raise`](crate::interrupt::raise) and [`task::id`](crate::task::id)
//! reach the scheduler without threading a handle through every work item.

use crate::runtime::RunError;
use crate::task::Id;
use crate::utils::ScopeGuard;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

mod shared;
pub(crate) use shared::Core;

thread_local! {
    static CONTEXT: RefCell<Option<Rc<Core>>> = const { RefCell::new(None) };

    static CURRENT_TASK_ID: Cell<Option<Id>> = const { Cell::new(None) };
}

/// Installs `core` as the running scheduler until the returned guard drops.
///
/// Only one scheduler may run on a thread at a time: a work item that calls
/// `run_to_completion` on another scheduler gets [`RunError::AlreadyRunning`].
pub(crate) fn enter(core: Rc<Core>) -> Result<ScopeGuard<impl FnOnce()>, RunError> {
    CONTEXT.with(|ctx| {
        let mut ctx = ctx.borrow_mut();
        if ctx.is_some() {
            return Err(RunError::AlreadyRunning);
        }

        *ctx = Some(core);
        Ok(())
    })?;

    Ok(ScopeGuard::new(|| {
        CONTEXT.with(|ctx| ctx.borrow_mut().take());
    }))
}

/// Returns the running scheduler's core, if any.
//
// The Rc is cloned out so the RefCell borrow is not held while the caller
// runs arbitrary code (interrupt handlers can spawn, spawn can log, ...).
pub(crate) fn try_core() -> Option<Rc<Core>> {
    CONTEXT.with(|ctx| ctx.borrow().clone())
}

#[track_caller]
pub(crate) fn expect_core() -> Rc<Core> {
    match try_core() {
        Some(core) => core,
        None => panic!("must be called from within a running turnstile scheduler"),
    }
}

/// Runs `f` with the running scheduler's core.
///
/// # Panics
///
/// Panics when no scheduler is running on this thread.
#[track_caller]
pub(crate) fn with_core<R>(f: impl FnOnce(&Core) -> R) -> R {
    let core = expect_core();
    f(&core)
}

pub(crate) fn current_task_id() -> Option<Id> {
    CURRENT_TASK_ID.with(|id| id.get())
}

pub(crate) fn set_current_task_id(id: Option<Id>) -> Option<Id> {
    CURRENT_TASK_ID.with(|current| current.replace(id))
}
