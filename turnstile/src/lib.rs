//! A miniature cooperative concurrency runtime.
//!
//! A single-threaded [`Scheduler`] runs tasks round-robin: every round gives
//! each active task one turn, where its work item (any [`Future`]) is polled
//! once. Returning `Pending` is a suspension point, `Ready` ends the task.
//! On top of it, [`sync::Lock`] provides mutual exclusion whose acquisition
//! suspends instead of blocking, and [`interrupt`] simulates out-of-band
//! handlers that run between two instructions of a task.
//!
//! ```ignore
//! use std::rc::Rc;
//! use turnstile::sync::Lock;
//!
//! let lock = Rc::new(Lock::new());
//! let mut scheduler = turnstile::Scheduler::new();
//!
//! for (name, iterations) in [("a", 2), ("b", 3)] {
//!     let lock = lock.clone();
//!     scheduler.submit(async move {
//!         for i in 0..iterations {
//!             let _guard = lock.acquire().await;
//!             println!("{name}{i}");
//!         }
//!     });
//! }
//!
//! scheduler.run_to_completion()?;
//! ```

#[doc(inline)]
pub use turnstile_macros::main;

#[doc(inline)]
pub use turnstile_macros::test;

mod context;

mod future;
pub use future::{YieldNow, yield_now};

pub mod interrupt;

pub mod runtime;
pub use runtime::{Builder, Scheduler, block_on, spawn, spawn_named};

pub mod sync;

pub mod task;

mod utils;

#[cfg(test)]
mod test_utils;
