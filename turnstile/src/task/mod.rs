//! Tasks and the handles used to observe or cancel them.
//!
//! A task wraps one work item: any [`Future`](std::future::Future). Each time
//! the scheduler gives the task a turn it polls the work item exactly once.
//! `Poll::Pending` is a suspension point, `Poll::Ready` hands the final value
//! to the task's [`JoinHandle`] and the task is removed at the end of the
//! round.

mod abort;
pub use abort::AbortHandle;

mod error;
pub use error::JoinError;
pub(crate) use error::panic_payload_as_str;

mod header;
pub(crate) use header::Header;
pub use header::Stage;

mod id;
pub use id::{Id, id, try_id};

mod join;
pub use join::JoinHandle;

#[allow(clippy::module_inception)]
mod task;
pub(crate) use task::{Resume, Task, new_task};
