use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use crate::core::{JobId, Outcome};
use crate::runtime::slot::JobRecord;
use crate::runtime::Runtime;

/// Completion handle returned by [`Job::cancel`](crate::job::Job::cancel).
///
/// Resolves once the target job is `Done`, with the job's actual outcome:
/// usually [`Outcome::Cancelled`], but a job that had already settled
/// reports what it settled with. Every handle for the same job resolves to
/// the same outcome.
#[must_use = "dropping a Cancellation does not undo it, but its outcome is lost"]
pub struct Cancellation {
    rt: Runtime,
    record: Rc<JobRecord>,
}

impl Cancellation {
    pub(crate) fn new(rt: Runtime, record: Rc<JobRecord>) -> Self {
        Self { rt, record }
    }

    /// The job being cancelled.
    #[must_use]
    pub fn job_id(&self) -> JobId {
        self.record.id
    }

    /// True once the job has settled.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.record.settlement.borrow().is_some()
    }

    /// The outcome, if the job has settled.
    #[must_use]
    pub fn outcome(&self) -> Option<Outcome<()>> {
        self.record
            .settlement()
            .map(|s| s.into_outcome(&self.record.name, Some(())))
    }

    /// The runtime the job belongs to.
    #[must_use]
    pub fn runtime(&self) -> &Runtime {
        &self.rt
    }
}

impl Future for Cancellation {
    type Output = Outcome<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.outcome() {
            Some(outcome) => Poll::Ready(outcome),
            None => {
                self.record.register_waiter(cx.waker());
                Poll::Pending
            }
        }
    }
}

impl fmt::Debug for Cancellation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cancellation")
            .field("job", &self.record.name)
            .field("complete", &self.is_complete())
            .finish()
    }
}
