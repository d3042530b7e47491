use super::*;
use crate::Scheduler;
use crate::context;
use crate::interrupt::{self, Line};
use crate::task;
use crate::test_utils::Journal;
use crate::yield_now;
use anyhow::Result;
use futures::task::noop_waker_ref;
use rstest::rstest;
use static_assertions::assert_impl_all;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::pin::pin;
use std::rc::Rc;
use std::task::{Context, Poll};

assert_impl_all!(Lock: Send, Sync, Default);

fn current_round() -> u64 {
    context::with_core(|core| core.round())
}

#[test]
fn test_try_acquire_and_release_are_idempotent() {
    let lock = Lock::new();
    assert!(!lock.is_held());

    assert!(lock.try_acquire());
    assert!(!lock.try_acquire());
    assert!(!lock.try_acquire());
    assert!(lock.is_held());

    assert_eq!(lock.release(), Ok(()));
    assert_eq!(lock.release(), Err(LockError::NotHeld));
    assert_eq!(lock.release(), Err(LockError::NotHeld));

    // Released again, so exactly one more caller gets in.
    assert!(lock.try_acquire());
    assert!(!lock.try_acquire());
    assert_eq!(lock.release(), Ok(()));
}

#[test]
fn test_release_never_acquired() {
    let lock = Lock::default();
    assert_eq!(lock.release(), Err(LockError::NotHeld));
    assert_eq!(
        LockError::NotHeld.to_string(),
        "lock released while not held"
    );
}

#[test]
fn test_try_lock() {
    let lock = Lock::new();

    let guard = lock.try_lock().expect("lock is free");
    assert!(lock.try_lock().is_none());
    assert!(std::ptr::eq(guard.lock(), &lock));

    guard.unlock();
    assert!(!lock.is_held());
    assert!(lock.try_lock().is_some());
    assert!(!lock.is_held());
}

fn early_return(lock: &Lock, bail: bool) -> Result<u32> {
    let _guard = lock
        .try_lock()
        .ok_or_else(|| anyhow::anyhow!("lock is busy"))?;
    if bail {
        anyhow::bail!("bailing out with the lock held");
    }
    Ok(7)
}

#[test]
fn test_guard_releases_on_every_exit_path() {
    let lock = Lock::new();

    // Fall-through.
    {
        let _guard = lock.try_lock().unwrap();
        assert!(lock.is_held());
    }
    assert!(!lock.is_held());

    // Early return.
    assert!(early_return(&lock, true).is_err());
    assert!(!lock.is_held());
    assert_eq!(early_return(&lock, false).unwrap(), 7);
    assert!(!lock.is_held());

    // Unwinding.
    let res = panic::catch_unwind(AssertUnwindSafe(|| {
        let _guard = lock.spin_acquire();
        if lock.is_held() {
            panic!("panicking with the lock held");
        }
    }));
    assert!(res.is_err());
    assert!(!lock.is_held());
}

#[test]
fn test_release_refuses_a_guarded_lock() {
    let lock = Lock::new();
    let guard = lock.try_lock().unwrap();

    assert_eq!(lock.release(), Err(LockError::HeldByGuard));
    assert_eq!(lock.release(), Err(LockError::HeldByGuard));
    assert!(lock.is_held());
    assert!(!lock.try_acquire());
    assert!(lock.try_lock().is_none());

    drop(guard);
    assert!(!lock.is_held());
    assert_eq!(lock.release(), Err(LockError::NotHeld));
    assert!(lock.try_lock().is_some());
}

#[test]
fn test_raw_hold_blocks_guards() {
    let lock = Lock::new();
    assert!(lock.try_acquire());

    assert!(lock.try_lock().is_none());
    assert_eq!(
        lock.spin_acquire_bounded(3).unwrap_err(),
        LockError::SpinLimitExceeded { spins: 3 }
    );

    assert_eq!(lock.release(), Ok(()));
    assert!(lock.try_lock().is_some());
}

#[test]
#[should_panic(expected = "lock guard released while not held")]
fn test_guard_detects_lock_taken_away() {
    let lock = Lock::new();
    let guard = lock.try_lock().unwrap();

    lock.force_free();
    drop(guard);
}

#[test]
fn test_guard_check_stays_quiet_while_unwinding() {
    let lock = Lock::new();

    // A second panic from the guard would abort the test binary.
    let res = panic::catch_unwind(AssertUnwindSafe(|| {
        let _guard = lock.try_lock().unwrap();
        lock.force_free();
        panic!("critical section failed");
    }));

    let payload = res.unwrap_err();
    assert_eq!(
        payload.downcast_ref::<&str>(),
        Some(&"critical section failed")
    );
    assert!(!lock.is_held());
}

#[test]
fn test_acquire_suspends_once_even_when_free() {
    let lock = Lock::new();
    let mut cx = Context::from_waker(noop_waker_ref());
    let mut acquire = pin!(lock.acquire());

    assert!(acquire.as_mut().poll(&mut cx).is_pending());
    assert!(!lock.is_held());

    let Poll::Ready(guard) = acquire.as_mut().poll(&mut cx) else {
        panic!("free lock not acquired on the second poll");
    };
    assert!(lock.is_held());

    drop(guard);
    assert!(!lock.is_held());
}

#[test]
#[should_panic(expected = "`Acquire` polled after completion")]
fn test_acquire_polled_after_completion_panics() {
    let lock = Lock::new();
    let mut cx = Context::from_waker(noop_waker_ref());
    let mut acquire = pin!(lock.acquire());

    let _ = acquire.as_mut().poll(&mut cx);
    let _guard = acquire.as_mut().poll(&mut cx);
    let _ = acquire.as_mut().poll(&mut cx);
}

#[test]
fn test_spin_acquire_bounded() {
    let lock = Lock::new();

    let guard = lock.spin_acquire_bounded(0).unwrap();
    assert_eq!(
        lock.spin_acquire_bounded(100).unwrap_err(),
        LockError::SpinLimitExceeded { spins: 100 }
    );

    drop(guard);
    assert!(lock.spin_acquire_bounded(0).is_ok());
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Enter(usize),
    Exit(usize),
}

#[rstest]
#[case::two(2)]
#[case::three(3)]
#[case::five(5)]
fn test_critical_sections_never_overlap(#[case] n: usize) -> Result<()> {
    const ITERATIONS: usize = 3;

    let lock = Rc::new(Lock::new());
    let inside = Rc::new(Cell::new(false));
    let events = Journal::new();
    let mut scheduler = Scheduler::new();

    for worker in 0..n {
        let lock = lock.clone();
        let inside = inside.clone();
        let events = events.clone();

        scheduler.submit(async move {
            for _ in 0..ITERATIONS {
                let _guard = lock.acquire().await;

                assert!(!inside.replace(true), "critical sections overlap");
                events.push(Event::Enter(worker));

                // Hold the lock across a few rounds, a different number per
                // worker, so every contention pattern shows up.
                for _ in 0..worker % 3 {
                    yield_now().await;
                }

                events.push(Event::Exit(worker));
                inside.set(false);
            }
        });
    }

    let report = scheduler.run_to_completion()?;
    assert_eq!(report.completed, n);
    assert!(!lock.is_held());

    let events = events.take();
    assert_eq!(events.len(), 2 * n * ITERATIONS);
    for pair in events.chunks(2) {
        let [Event::Enter(a), Event::Exit(b)] = pair else {
            panic!("unbalanced critical section {pair:?}");
        };
        assert_eq!(a, b);
    }

    Ok(())
}

#[test]
fn test_three_tasks_round_trip() -> Result<()> {
    let lock = Rc::new(Lock::new());
    let output = Journal::new();
    let mut scheduler = Scheduler::new();

    for (name, iterations) in [("A", 2), ("B", 3), ("C", 5)] {
        let lock = lock.clone();
        let output = output.clone();

        scheduler.submit_named(name, async move {
            for i in 0..iterations {
                let _guard = lock.acquire().await;
                output.push((current_round(), format!("{name}{i}")));
            }
        });
    }

    let report = scheduler.run_to_completion()?;

    let (rounds, lines): (Vec<u64>, Vec<String>) = output.take().into_iter().unzip();
    assert_eq!(
        lines,
        ["A0", "B0", "C0", "A1", "B1", "C1", "B2", "C2", "C3", "C4"]
    );

    // All three once per round while all three live, then the longest alone.
    assert_eq!(rounds, [2, 2, 2, 3, 3, 3, 4, 4, 5, 6]);
    assert_eq!(report.rounds, 6);
    assert_eq!(report.completed, 3);
    Ok(())
}

#[test]
fn test_acquire_yields_between_critical_sections() -> Result<()> {
    const ITERATIONS: usize = 4;

    let lock = Rc::new(Lock::new());
    let output = Journal::new();
    let mut scheduler = Scheduler::new();

    for name in ["a", "b"] {
        let lock = lock.clone();
        let output = output.clone();

        scheduler.submit(async move {
            for _ in 0..ITERATIONS {
                let _guard = lock.acquire().await;
                output.push((current_round(), name));
            }
        });
    }

    let report = scheduler.run_to_completion()?;
    let output = output.take();

    // Every acquisition costs its task one round: no task gets the lock twice
    // in a round, and both tasks alternate.
    for (round, pair) in (2..).zip(output.chunks(2)) {
        assert_eq!(pair, [(round, "a"), (round, "b")]);
    }
    assert_eq!(report.rounds, ITERATIONS as u64 + 1);
    Ok(())
}

#[test]
fn test_eager_try_acquire_starves_siblings() -> Result<()> {
    const ITERATIONS: usize = 4;

    let lock = Rc::new(Lock::new());
    let output = Journal::new();
    let mut scheduler = Scheduler::new();

    let eager_lock = lock.clone();
    let eager_output = output.clone();
    scheduler.submit(async move {
        // Never suspends between two critical sections.
        for _ in 0..ITERATIONS {
            if let Some(_guard) = eager_lock.try_lock() {
                eager_output.push((current_round(), "eager"));
            }
        }
    });

    let polite_output = output.clone();
    scheduler.submit(async move {
        let _guard = lock.acquire().await;
        polite_output.push((current_round(), "polite"));
    });

    scheduler.run_to_completion()?;

    let output = output.take();
    assert_eq!(output.len(), ITERATIONS + 1);
    assert!(output[..ITERATIONS].iter().all(|entry| *entry == (1, "eager")));
    assert_eq!(output[ITERATIONS], (2, "polite"));
    Ok(())
}

#[test]
fn test_contended_acquire_waits_for_release() -> Result<()> {
    let lock = Rc::new(Lock::new());
    let output = Journal::new();
    let mut scheduler = Scheduler::new();

    let holder_lock = lock.clone();
    let holder_output = output.clone();
    scheduler.submit_named("holder", async move {
        let guard = holder_lock.acquire().await;
        holder_output.push((current_round(), "holder acquired"));

        for _ in 0..3 {
            yield_now().await;
        }

        guard.unlock();
        holder_output.push((current_round(), "holder released"));
    });

    let waiter_output = output.clone();
    scheduler.submit_named("waiter", async move {
        let _guard = lock.acquire().await;
        waiter_output.push((current_round(), "waiter acquired"));
    });

    scheduler.run_to_completion()?;

    assert_eq!(
        output.take(),
        [
            (2, "holder acquired"),
            (5, "holder released"),
            (5, "waiter acquired"),
        ]
    );
    Ok(())
}

#[test]
fn test_aborted_holder_releases() -> Result<()> {
    let lock = Rc::new(Lock::new());
    let mut scheduler = Scheduler::new();

    let holder_lock = lock.clone();
    let holder = scheduler.submit(async move {
        let _guard = holder_lock.acquire().await;
        std::future::pending::<()>().await;
    });

    let holder_abort = holder.abort_handle();
    let waiter_lock = lock.clone();
    let waiter = scheduler.submit(async move {
        yield_now().await;
        yield_now().await;
        assert!(waiter_lock.is_held());

        holder_abort.abort();
        let _guard = waiter_lock.acquire().await;
        current_round()
    });

    scheduler.run_to_completion()?;

    assert!(holder.try_take().unwrap().unwrap_err().is_cancelled());
    // Aborted at the start of round 4, acquired on the poll after the
    // initial suspension.
    assert_eq!(waiter.try_take().unwrap()?, 4);
    assert!(!lock.is_held());
    Ok(())
}

/// Check-then-set done in two steps, with an instruction boundary in between.
#[derive(Debug, Default)]
struct NaiveLock {
    held: Cell<bool>,
}

impl NaiveLock {
    fn try_acquire(&self) -> bool {
        if self.held.get() {
            return false;
        }
        interrupt::checkpoint();
        self.held.set(true);
        true
    }
}

#[test]
fn test_interrupt_race_on_check_then_set() -> Result<()> {
    let lock = Rc::new(NaiveLock::default());
    let winners = Journal::new();
    let mut scheduler = Scheduler::new();

    let handler_lock = lock.clone();
    let handler_winners = winners.clone();
    scheduler.register_interrupt(Line(0), move |_| {
        if handler_lock.try_acquire() {
            handler_winners.push("handler");
        }
    });

    let task_winners = winners.clone();
    scheduler.submit(async move {
        interrupt::raise(Line(0));
        if lock.try_acquire() {
            task_winners.push("task");
        }
    });

    scheduler.run_to_completion()?;

    // Both saw the flag clear before either set it.
    assert_eq!(winners.take(), ["handler", "task"]);
    Ok(())
}

#[rstest]
#[case::before_the_swap(true)]
#[case::after_the_swap(false)]
fn test_interrupt_race_on_compare_and_swap(#[case] interrupt_first: bool) -> Result<()> {
    let lock = Rc::new(Lock::new());
    let winners = Journal::new();
    let mut scheduler = Scheduler::new();

    let handler_lock = lock.clone();
    let handler_winners = winners.clone();
    scheduler.register_interrupt(Line(0), move |_| {
        if handler_lock.try_acquire() {
            handler_winners.push("handler");
        }
    });

    let task_winners = winners.clone();
    scheduler.submit(async move {
        interrupt::raise(Line(0));
        if interrupt_first {
            interrupt::checkpoint();
        }

        if lock.try_acquire() {
            task_winners.push("task");
        }
        interrupt::checkpoint();
    });

    scheduler.run_to_completion()?;

    let expected = if interrupt_first { "handler" } else { "task" };
    assert_eq!(winners.take(), [expected]);
    Ok(())
}

const SPIN_BUDGET: u64 = 10_000;

/// A task takes the lock, then an interrupt whose handler spins on the same
/// lock fires while the task holds it.
fn interrupted_holder(scheduler: &mut Scheduler, lock: Rc<Lock>) -> task::JoinHandle<()> {
    scheduler.submit_named("holder", async move {
        let _guard = lock.acquire().await;
        interrupt::trigger(Line(1));
    })
}

#[test]
fn test_spinning_in_a_handler_cannot_make_progress() -> Result<()> {
    let lock = Rc::new(Lock::new());
    let outcome = Journal::new();
    let mut scheduler = Scheduler::new();

    let handler_lock = lock.clone();
    let handler_outcome = outcome.clone();
    scheduler.register_interrupt(Line(1), move |frame| {
        // The holder is the task this handler interrupted: it cannot run again
        // until the handler returns, so an unbounded spin would never end.
        assert!(frame.interrupted().is_some());
        handler_outcome.push(handler_lock.spin_acquire_bounded(SPIN_BUDGET).err());
    });

    let holder = interrupted_holder(&mut scheduler, lock.clone());
    scheduler.run_to_completion()?;

    assert_eq!(
        outcome.take(),
        [Some(LockError::SpinLimitExceeded { spins: SPIN_BUDGET })]
    );
    assert!(holder.is_finished());
    assert!(!lock.is_held());
    Ok(())
}

#[test]
fn test_deferring_to_a_task_avoids_the_deadlock() -> Result<()> {
    let lock = Rc::new(Lock::new());
    let output = Journal::new();
    let mut scheduler = Scheduler::new();

    let handler_lock = lock.clone();
    let handler_output = output.clone();
    scheduler.register_interrupt(Line(1), move |frame| {
        let lock = handler_lock.clone();
        let output = handler_output.clone();

        frame.spawn(async move {
            let _guard = lock.acquire().await;
            output.push("deferred work");
        });
    });

    let holder_output = output.clone();
    let holder_lock = lock.clone();
    scheduler.submit_named("holder", async move {
        let guard = holder_lock.acquire().await;
        interrupt::trigger(Line(1));
        yield_now().await;
        holder_output.push("holder done");
        drop(guard);
    });

    let report = scheduler.run_to_completion()?;

    assert_eq!(output.take(), ["holder done", "deferred work"]);
    assert_eq!(report.completed, 2);
    assert!(!lock.is_held());
    Ok(())
}

#[test]
fn test_masking_interrupts_avoids_the_deadlock() -> Result<()> {
    let lock = Rc::new(Lock::new());
    let output = Journal::new();
    let mut scheduler = Scheduler::new();

    let handler_lock = lock.clone();
    let handler_output = output.clone();
    scheduler.register_interrupt(Line(1), move |_| {
        let guard = handler_lock.spin_acquire_bounded(SPIN_BUDGET);
        handler_output.push(format!("handler acquired: {}", guard.is_ok()));
    });

    let holder_output = output.clone();
    scheduler.submit_named("holder", async move {
        interrupt::without_interrupts(|| {
            let _guard = lock.try_lock().expect("lock is free");
            interrupt::trigger(Line(1));
            holder_output.push("critical section".to_string());
        });
    });

    scheduler.run_to_completion()?;

    assert_eq!(
        output.take(),
        ["critical section", "handler acquired: true"]
    );
    Ok(())
}

#[test]
#[should_panic(expected = "`Lock::acquire` polled from interrupt context")]
fn test_acquire_from_interrupt_context_panics() {
    let lock = Rc::new(Lock::new());
    let mut scheduler = Scheduler::new();

    let handler_lock = lock.clone();
    scheduler.register_interrupt(Line(0), move |_| {
        let mut cx = Context::from_waker(noop_waker_ref());
        let mut acquire = pin!(handler_lock.acquire());
        let _ = acquire.as_mut().poll(&mut cx);
    });

    scheduler.submit(async {
        interrupt::trigger(Line(0));
    });

    let _ = scheduler.run_to_completion();
}
