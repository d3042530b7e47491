use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockError {
    /// Release of a free lock: a double release, or a release of a lock that
    /// was never acquired.
    #[error("lock released while not held")]
    NotHeld,

    /// Release of a lock taken through a [`Guard`](crate::sync::Guard). The
    /// lock stays held until the guard is dropped.
    #[error("lock is held through a guard, drop the guard to release it")]
    HeldByGuard,

    #[error("lock still held after {spins} spins")]
    SpinLimitExceeded { spins: u64 },
}
