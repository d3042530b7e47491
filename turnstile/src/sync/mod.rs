//! Cooperative mutual exclusion.
//!
//! [`Lock`] is a single atomic word. Tasks acquire it with the suspend-capable
//! [`Lock::acquire`], which hands control back to the scheduler while the lock
//! is contended instead of blocking the one thread everything runs on. The
//! returned [`Guard`] releases the lock when it goes out of scope, whichever
//! way the scope is left.
//!
//! ```ignore
//! let lock = Rc::new(Lock::new());
//!
//! for name in ["a", "b"] {
//!     let lock = lock.clone();
//!     scheduler.submit(async move {
//!         let _guard = lock.acquire().await;
//!         println!("{name} holds the lock");
//!     });
//! }
//! ```

mod error;
pub use error::LockError;

mod guard;
pub use guard::Guard;

mod lock;
pub use lock::{Acquire, Lock};

#[cfg(test)]
mod tests;
