use std::pin::Pin;
use std::task::{Context, Poll};

/// Future returned by [`yield_now`].
#[derive(Debug, Clone, Copy)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct YieldNow {
    awaiting_first_poll: bool,
}

/// Suspends the current task once, giving every other active task a turn
/// before it continues.
///
/// This is the basic suspension point: the returned future is `Pending` on its
/// first poll and `Ready(())` on the next one.
pub fn yield_now() -> YieldNow {
    YieldNow {
        awaiting_first_poll: true,
    }
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        // Only yield on first poll. Next round we return.
        if self.awaiting_first_poll {
            self.awaiting_first_poll = false;

            // The scheduler polls every active task each round anyway, but a
            // foreign executor driving this future needs the wake.
            cx.waker().wake_by_ref();
            Poll::Pending
        } else {
            Poll::Ready(())
        }
    }
}
