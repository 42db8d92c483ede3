//! Ready set and job wakers.
//!
//! Wakers are the single funnel through which external events (channel
//! handoffs, timers, foreign awaitables, possibly from other threads) get a
//! parked job resumed: waking only enqueues the job id, and the trampoline
//! resumes it later.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::task::{Wake, Waker};
use tokio::sync::Notify;

use crate::core::JobId;

/// FIFO of jobs due for resumption, deduplicated.
#[derive(Debug, Default)]
pub(crate) struct ReadyQueue {
    queue: Mutex<VecDeque<JobId>>,
    notify: Notify,
}

impl ReadyQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Creates a waker that enqueues `job` when woken.
    pub(crate) fn waker_for(self: &Arc<Self>, job: JobId) -> Waker {
        Waker::from(Arc::new(JobWaker {
            queue: Arc::clone(self),
            job,
        }))
    }

    pub(crate) fn push(&self, job: JobId) {
        {
            let mut queue = self.queue.lock();
            if queue.contains(&job) {
                return;
            }
            queue.push_back(job);
        }
        self.notify.notify_one();
    }

    pub(crate) fn pop(&self) -> Option<JobId> {
        self.queue.lock().pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub(crate) fn clear(&self) {
        self.queue.lock().clear();
    }

    /// Used by the async driver to sleep until something is enqueued.
    pub(crate) fn notify(&self) -> &Notify {
        &self.notify
    }
}

struct JobWaker {
    queue: Arc<ReadyQueue>,
    job: JobId,
}

impl Wake for JobWaker {
    fn wake(self: Arc<Self>) {
        self.queue.push(self.job);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.queue.push(self.job);
    }
}
