//! The typed job handle.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::Duration;
use uuid::Uuid;

use crate::cancellation::Cancellation;
use crate::core::{JobId, JobState, Outcome};
use crate::errors::Failure;
use crate::runtime::slot::JobRecord;
use crate::runtime::Runtime;

/// Handle to a spawned job producing a `T`.
///
/// Handles are cheap to clone. The success value is moved out to the first
/// consumer (`join`, `outcome`, or a driver); later consumers see a failure
/// saying the value was already taken. Use [`Job::result`] for a cloning
/// snapshot.
pub struct Job<T> {
    rt: Runtime,
    record: Rc<JobRecord>,
    value: Rc<RefCell<Option<T>>>,
}

impl<T> Clone for Job<T> {
    fn clone(&self) -> Self {
        Self {
            rt: self.rt.clone(),
            record: Rc::clone(&self.record),
            value: Rc::clone(&self.value),
        }
    }
}

impl<T> fmt::Debug for Job<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.record.id)
            .field("name", &self.record.name)
            .field("state", &self.record.state.get())
            .finish()
    }
}

impl<T: 'static> Job<T> {
    pub(crate) fn new(rt: Runtime, record: Rc<JobRecord>, value: Rc<RefCell<Option<T>>>) -> Self {
        Self { rt, record, value }
    }

    pub(crate) fn record(&self) -> &Rc<JobRecord> {
        &self.record
    }

    /// Arena id.
    #[must_use]
    pub fn id(&self) -> JobId {
        self.record.id
    }

    /// Diagnostic name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.record.name
    }

    /// Unique instance identity (UUID v7).
    #[must_use]
    pub fn instance(&self) -> Uuid {
        self.record.instance
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> JobState {
        self.record.state.get()
    }

    /// True once the job has settled.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.record.state.get() == JobState::Done
    }

    /// True if the job settled with a failure or timed out.
    #[must_use]
    pub fn failed(&self) -> bool {
        self.record
            .settlement
            .borrow()
            .as_ref()
            .is_some_and(|s| s.is_failure())
    }

    /// The failure the job settled with, if any.
    #[must_use]
    pub fn failure(&self) -> Option<Failure> {
        self.record
            .settlement
            .borrow()
            .as_ref()
            .and_then(|s| s.as_failure())
    }

    /// The runtime this job belongs to.
    #[must_use]
    pub fn runtime(&self) -> &Runtime {
        &self.rt
    }

    /// Waits for the job and returns its value.
    ///
    /// Inside a coroutine, `job.join().await?` fails the caller with a
    /// failure attributed to the caller and caused by this job's failure.
    /// A cancelled job yields a [`Cause::Cancelled`](crate::errors::Cause::Cancelled) failure.
    pub fn join(&self) -> Join<T> {
        self.record.observed.set(true);
        Join {
            inner: self.outcome_inner(),
        }
    }

    /// Waits for the job and returns its raw outcome. Never fails.
    pub fn outcome(&self) -> OutcomeFuture<T> {
        self.record.observed.set(true);
        self.outcome_inner()
    }

    fn outcome_inner(&self) -> OutcomeFuture<T> {
        OutcomeFuture {
            record: Rc::clone(&self.record),
            value: Rc::clone(&self.value),
        }
    }

    /// Cancels the job using the runtime's default grace period.
    ///
    /// Idempotent: finalizers run once no matter how often this is called.
    pub fn cancel(&self) -> Cancellation {
        self.rt.request_cancel(&self.record, None)
    }

    /// Cancels the job, force-settling it if it has not finished cleaning up
    /// within `grace`.
    pub fn cancel_with_grace(&self, grace: Duration) -> Cancellation {
        self.rt.request_cancel(&self.record, Some(grace))
    }

    /// Arms a timeout: if the job is not done after `after`, it is cancelled
    /// and settles as timed out.
    #[must_use]
    pub fn timeout(self, after: Duration) -> Self {
        if !self.is_done() {
            self.rt.arm_timeout(self.record.id, after);
        }
        self
    }

    /// Moves the outcome out if the job has settled.
    pub fn take_outcome(&self) -> Option<Outcome<T>> {
        let settlement = self.record.settlement()?;
        Some(settlement.into_outcome(&self.record.name, self.value.borrow_mut().take()))
    }
}

impl<T: Clone + 'static> Job<T> {
    /// Snapshot of the outcome, if the job has settled.
    #[must_use]
    pub fn result(&self) -> Option<Outcome<T>> {
        let settlement = self.record.settlement()?;
        Some(settlement.into_outcome(&self.record.name, self.value.borrow().clone()))
    }
}

/// Future returned by [`Job::outcome`].
#[must_use = "futures do nothing unless awaited"]
pub struct OutcomeFuture<T> {
    record: Rc<JobRecord>,
    value: Rc<RefCell<Option<T>>>,
}

impl<T> Future for OutcomeFuture<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Outcome<T>> {
        match self.record.settlement() {
            Some(settlement) => {
                let value = self.value.borrow_mut().take();
                Poll::Ready(settlement.into_outcome(&self.record.name, value))
            }
            None => {
                self.record.register_waiter(cx.waker());
                Poll::Pending
            }
        }
    }
}

/// Future returned by [`Job::join`].
#[must_use = "futures do nothing unless awaited"]
pub struct Join<T> {
    inner: OutcomeFuture<T>,
}

impl<T> Future for Join<T> {
    type Output = Result<T, Failure>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let name = self.inner.record.name.clone();
        Pin::new(&mut self.inner)
            .poll(cx)
            .map(|outcome| outcome.into_result(&name))
    }
}
