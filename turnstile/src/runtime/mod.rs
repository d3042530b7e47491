//! The scheduler and its configuration.

use crate::context;
use crate::task::JoinHandle;
use std::future::Future;

mod builder;
pub use builder::{Builder, FailurePolicy};
pub(crate) use builder::RuntimeConfig;

mod error;
pub use error::RunError;

mod scheduler;
pub use scheduler::{RunReport, Scheduler};

/// Runs `future` to completion on a new default [`Scheduler`] and returns its
/// output.
///
/// ```ignore
/// let answer = turnstile::block_on(async {
///     let handle = turnstile::spawn(async { 40 });
///     handle.await.unwrap() + 2
/// });
/// assert_eq!(answer, 42);
/// ```
///
/// # Panics
///
/// Panics when called from inside a running scheduler, or when `future`
/// panics.
#[track_caller]
pub fn block_on<F>(future: F) -> F::Output
where
    F: Future + 'static,
    F::Output: 'static,
{
    Scheduler::new().block_on(future)
}

/// Spawns a new task on the running scheduler.
///
/// The task joins the active set at the end of the current round, so it gets
/// its first turn in the next one.
///
/// # Panics
///
/// Panics when called outside of a running scheduler.
#[track_caller]
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + 'static,
    F::Output: 'static,
{
    context::with_core(|core| core.spawn(future, None))
}

/// Like [`spawn`], with a name that shows up in log events.
#[track_caller]
pub fn spawn_named<F>(name: impl Into<String>, future: F) -> JoinHandle<F::Output>
where
    F: Future + 'static,
    F::Output: 'static,
{
    let name = name.into();
    context::with_core(|core| core.spawn(future, Some(name)))
}
