use std::cell::RefCell;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

/// Hand-written work item: `Pending` `n` times, then `Ready(n)`.
#[derive(Debug)]
pub(crate) struct Countdown {
    total: usize,
    remaining: usize,
}

impl Countdown {
    pub(crate) fn new(n: usize) -> Self {
        Self {
            total: n,
            remaining: n,
        }
    }
}

impl Future for Countdown {
    type Output = usize;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<usize> {
        if self.remaining == 0 {
            return Poll::Ready(self.total);
        }

        self.remaining -= 1;
        Poll::Pending
    }
}

/// Never completes.
#[derive(Debug, Default)]
pub(crate) struct Forever;

impl Future for Forever {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        Poll::Pending
    }
}

/// Append-only log shared between the work items of one test.
#[derive(Debug)]
pub(crate) struct Journal<T> {
    entries: Rc<RefCell<Vec<T>>>,
}

impl<T> Clone for Journal<T> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<T> Journal<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub(crate) fn push(&self, entry: T) {
        self.entries.borrow_mut().push(entry);
    }

    pub(crate) fn take(&self) -> Vec<T> {
        std::mem::take(&mut *self.entries.borrow_mut())
    }
}
