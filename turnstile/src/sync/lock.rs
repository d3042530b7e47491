use crate::interrupt;
use crate::sync::{Guard, LockError};
use std::fmt;
use std::hint;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::task::{Context, Poll};
use tracing::trace;

const FREE: u8 = 0;
const RAW: u8 = 1;
const GUARDED: u8 = 2;

/// A mutual-exclusion primitive for tasks multiplexed on one scheduler.
///
/// The whole state is one word: free, held raw through
/// [`try_acquire`](Self::try_acquire), or held by a [`Guard`]. It is only
/// reachable through the methods below and only mutated with atomic
/// read-modify-write operations, so an interrupt handler running between any
/// two instructions of a task can never observe the lock as free and claim it
/// at the same time as the task.
///
/// Share it by reference: `Rc<Lock>`, `Arc<Lock>` or a `static`.
pub struct Lock {
    state: AtomicU8,
}

impl Lock {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(FREE),
        }
    }

    /// Attempts to take the lock without suspending.
    ///
    /// The check and the set are a single compare-and-swap. Returns `false`
    /// when the lock is already held, and nothing else happens: a caller that
    /// ignores the result just carries on without the lock. Retrying is the
    /// caller's business. Prefer [`try_lock`](Self::try_lock), which hands out
    /// a [`Guard`].
    pub fn try_acquire(&self) -> bool {
        self.transition(FREE, RAW)
    }

    /// Attempts to take the lock without suspending, returning a guard on
    /// success.
    pub fn try_lock(&self) -> Option<Guard<'_>> {
        self.try_guard()
    }

    fn try_guard(&self) -> Option<Guard<'_>> {
        self.transition(FREE, GUARDED).then(|| Guard::new(self))
    }

    fn transition(&self, from: u8, to: u8) -> bool {
        let order = if to == FREE {
            Ordering::Release
        } else {
            Ordering::Acquire
        };

        self.state
            .compare_exchange(from, to, order, Ordering::Relaxed)
            .is_ok()
    }

    /// Takes the lock, suspending the calling task while it is contended.
    ///
    /// The returned future always suspends once before its first attempt,
    /// even when the lock is free. A task that acquires and releases in a
    /// loop therefore gives every other task a turn between two critical
    /// sections.
    ///
    /// # Panics
    ///
    /// Interrupt handlers cannot suspend. Polling the future from inside one
    /// panics.
    pub fn acquire(&self) -> Acquire<'_> {
        Acquire {
            lock: self,
            state: State::Start,
        }
    }

    /// Releases a lock taken with [`try_acquire`](Self::try_acquire). Never
    /// suspends.
    ///
    /// Returns [`LockError::NotHeld`] if the lock was free, and
    /// [`LockError::HeldByGuard`] if a [`Guard`] holds it. The lock is left
    /// untouched in both cases: a guarded lock is only released by dropping
    /// its guard.
    pub fn release(&self) -> Result<(), LockError> {
        match self
            .state
            .compare_exchange(RAW, FREE, Ordering::Release, Ordering::Relaxed)
        {
            Ok(_) => Ok(()),
            Err(GUARDED) => Err(LockError::HeldByGuard),
            Err(_) => Err(LockError::NotHeld),
        }
    }

    /// Called by [`Guard`] on drop. `false` means the guard did not own the
    /// lock anymore.
    pub(crate) fn release_guard(&self) -> bool {
        self.transition(GUARDED, FREE)
    }

    /// Frees the lock whatever holds it, to exercise the guard's checks.
    #[cfg(test)]
    pub(crate) fn force_free(&self) {
        self.state.store(FREE, Ordering::Release);
    }

    /// Busy-waits until the lock is free.
    ///
    /// Nothing else runs while this spins. Called from an interrupt handler
    /// that preempted the holder, or from a task while another task holds the
    /// lock, it never returns.
    pub fn spin_acquire(&self) -> Guard<'_> {
        loop {
            if let Some(guard) = self.try_guard() {
                return guard;
            }
            hint::spin_loop();
        }
    }

    /// Like [`spin_acquire`](Self::spin_acquire), but gives up after
    /// `max_spins` failed retries.
    pub fn spin_acquire_bounded(&self, max_spins: u64) -> Result<Guard<'_>, LockError> {
        if let Some(guard) = self.try_guard() {
            return Ok(guard);
        }

        for _ in 0..max_spins {
            hint::spin_loop();
            if let Some(guard) = self.try_guard() {
                return Ok(guard);
            }
        }

        Err(LockError::SpinLimitExceeded { spins: max_spins })
    }

    /// Snapshot of the state. Stale as soon as it is returned.
    pub fn is_held(&self) -> bool {
        self.state.load(Ordering::Relaxed) != FREE
    }
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state.load(Ordering::Relaxed) {
            FREE => "free",
            RAW => "raw",
            _ => "guarded",
        };

        f.debug_struct("Lock").field("state", &state).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Not polled yet.
    Start,

    /// Suspended at least once, `attempts` failed compare-and-swaps so far.
    Contending { attempts: u64 },

    Done,
}

/// Future returned by [`Lock::acquire`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Acquire<'a> {
    lock: &'a Lock,
    state: State,
}

impl<'a> Future for Acquire<'a> {
    type Output = Guard<'a>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Guard<'a>> {
        assert!(
            !interrupt::in_interrupt(),
            "`Lock::acquire` polled from interrupt context, handlers cannot suspend"
        );

        match self.state {
            State::Start => {
                self.state = State::Contending { attempts: 0 };
                cx.waker().wake_by_ref();
                Poll::Pending
            }
            State::Contending { attempts } => {
                if let Some(guard) = self.lock.try_guard() {
                    trace!(attempts, "lock acquired");
                    self.state = State::Done;
                    return Poll::Ready(guard);
                }

                self.state = State::Contending {
                    attempts: attempts + 1,
                };
                cx.waker().wake_by_ref();
                Poll::Pending
            }
            State::Done => panic!("`Acquire` polled after completion"),
        }
    }
}

impl fmt::Debug for Acquire<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Acquire")
            .field("lock", self.lock)
            .field("state", &self.state)
            .finish()
    }
}
