//! Sleep and yield futures.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use super::TimerHandle;
use crate::runtime::Runtime;

#[derive(Default)]
struct SleepShared {
    fired: Cell<bool>,
    waker: RefCell<Option<Waker>>,
}

/// Future that completes once the runtime clock reaches a deadline.
///
/// Dropping a pending `Sleep` (for example when its job is cancelled)
/// cancels the underlying timer.
#[must_use = "futures do nothing unless awaited"]
pub struct Sleep {
    rt: Runtime,
    deadline: Duration,
    shared: Rc<SleepShared>,
    timer: Option<TimerHandle>,
}

impl Sleep {
    pub(crate) fn until(rt: Runtime, deadline: Duration) -> Self {
        Self {
            rt,
            deadline,
            shared: Rc::new(SleepShared::default()),
            timer: None,
        }
    }

    /// Returns the absolute deadline.
    #[must_use]
    pub fn deadline(&self) -> Duration {
        self.deadline
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.shared.fired.get() || self.rt.now() >= self.deadline {
            if let Some(timer) = self.timer.take() {
                timer.cancel();
            }
            return Poll::Ready(());
        }

        *self.shared.waker.borrow_mut() = Some(cx.waker().clone());
        if self.timer.is_none() {
            let shared = Rc::clone(&self.shared);
            let handle = self.rt.schedule_at(self.deadline, move || {
                shared.fired.set(true);
                if let Some(waker) = shared.waker.borrow_mut().take() {
                    waker.wake();
                }
            });
            self.timer = Some(handle);
        }
        Poll::Pending
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }
}

/// Future that re-queues the current job once before completing.
#[must_use = "futures do nothing unless awaited"]
#[derive(Debug, Default)]
pub struct YieldNow {
    yielded: bool,
}

impl YieldNow {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}
